//! XML-Enc protection of assertions
//!
//! AES-256-GCM content encryption with an RSA-OAEP wrapped session key. The
//! `CipherValue` of the content is `IV (12) || ciphertext || tag (16)`.

use crate::error::{SamlError, SamlResult};
use crate::models::ServiceProvider;
use crate::saml::constants::{algorithms, DSIG_NS, XMLENC_NS};
use crate::saml::usable_rsa_certificate;
use crate::xml::XmlElement;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use openssl::encrypt::Encrypter;
use openssl::pkey::{PKey, Public};
use openssl::rand::rand_bytes;
use openssl::rsa::Padding;
use openssl::symm::{encrypt_aead, Cipher};

/// Smallest RSA modulus accepted for key transport
pub const MIN_ENCRYPTION_KEY_BITS: u32 = 2048;

pub const GCM_IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
const SESSION_KEY_LEN: usize = 32;

/// Encrypts assertions for an SP
pub struct AssertionEncryptor;

impl AssertionEncryptor {
    /// Replace the `Assertion` child of `response` with an `EncryptedAssertion`
    pub fn encrypt_in_place(
        response: &mut XmlElement,
        sp: &ServiceProvider,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let assertion = response
            .child("Assertion")
            .ok_or_else(|| SamlError::Internal("response has no assertion to encrypt".into()))?;
        let encrypted = Self::encrypt(assertion, sp, now)?;
        response
            .replace_child("Assertion", encrypted)
            .ok_or_else(|| SamlError::Internal("assertion vanished during encryption".into()))?;
        Ok(())
    }

    /// Build the `saml:EncryptedAssertion` for `assertion`
    pub fn encrypt(
        assertion: &XmlElement,
        sp: &ServiceProvider,
        now: DateTime<Utc>,
    ) -> SamlResult<XmlElement> {
        let (certificate, public_key) = sp
            .encryption_certificates
            .iter()
            .find_map(|cert| usable_rsa_certificate(cert, now, MIN_ENCRYPTION_KEY_BITS))
            .ok_or_else(|| {
                tracing::warn!(
                    sp = %sp.entity_id,
                    configured = sp.encryption_certificates.len(),
                    "No usable encryption certificate"
                );
                SamlError::NoValidEncryptionCertificate(sp.entity_id.clone())
            })?;

        let mut session_key = [0u8; SESSION_KEY_LEN];
        rand_bytes(&mut session_key)?;
        let mut iv = [0u8; GCM_IV_LEN];
        rand_bytes(&mut iv)?;

        let plaintext = assertion.to_xml();
        let mut tag = [0u8; GCM_TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &session_key,
            Some(&iv),
            &[],
            plaintext.as_bytes(),
            &mut tag,
        )?;

        let mut payload = Vec::with_capacity(GCM_IV_LEN + ciphertext.len() + GCM_TAG_LEN);
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);
        payload.extend_from_slice(&tag);

        let wrapped_key = wrap_key(&public_key, &session_key)?;
        let certificate_b64 = STANDARD.encode(certificate.to_der()?);

        tracing::debug!(sp = %sp.entity_id, "Encrypted assertion");

        Ok(encrypted_assertion(
            &STANDARD.encode(payload),
            &STANDARD.encode(wrapped_key),
            &certificate_b64,
        ))
    }
}

fn wrap_key(public_key: &PKey<Public>, session_key: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encrypter = Encrypter::new(public_key)?;
    encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
    let mut wrapped = vec![0u8; encrypter.encrypt_len(session_key)?];
    let len = encrypter.encrypt(session_key, &mut wrapped)?;
    wrapped.truncate(len);
    Ok(wrapped)
}

fn cipher_data(value: &str) -> XmlElement {
    XmlElement::new("xenc:CipherData")
        .with_child(XmlElement::new("xenc:CipherValue").with_text(value))
}

fn encrypted_assertion(payload_b64: &str, wrapped_key_b64: &str, certificate_b64: &str) -> XmlElement {
    let encrypted_key = XmlElement::new("xenc:EncryptedKey")
        .with_child(
            XmlElement::new("xenc:EncryptionMethod")
                .with_attr("Algorithm", algorithms::RSA_OAEP_MGF1P)
                .with_child(
                    XmlElement::new("ds:DigestMethod")
                        .with_attr("Algorithm", algorithms::DIGEST_SHA1),
                ),
        )
        .with_child(
            XmlElement::new("ds:KeyInfo").with_child(
                XmlElement::new("ds:X509Data").with_child(
                    XmlElement::new("ds:X509Certificate").with_text(certificate_b64),
                ),
            ),
        )
        .with_child(cipher_data(wrapped_key_b64));

    XmlElement::new("saml:EncryptedAssertion").with_child(
        XmlElement::new("xenc:EncryptedData")
            .with_attr("xmlns:xenc", XMLENC_NS)
            .with_attr("xmlns:ds", DSIG_NS)
            .with_attr("Type", algorithms::ENCRYPTED_ELEMENT)
            .with_child(
                XmlElement::new("xenc:EncryptionMethod")
                    .with_attr("Algorithm", algorithms::AES256_GCM),
            )
            .with_child(XmlElement::new("ds:KeyInfo").with_child(encrypted_key))
            .with_child(cipher_data(payload_b64)),
    )
}
