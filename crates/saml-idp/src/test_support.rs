//! Shared fixtures for unit tests: RSA keys and self-signed certificates

use crate::saml::SigningCredentials;
use crate::xml::XmlElement;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::encrypt::Decrypter;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::symm::{decrypt_aead, Cipher};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::sync::OnceLock;

static FIXTURE: OnceLock<(PKey<Private>, SigningCredentials)> = OnceLock::new();

pub fn generate_key() -> PKey<Private> {
    generate_key_with_bits(2048)
}

fn generate_key_with_bits(bits: u32) -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(bits).unwrap()).unwrap()
}

pub fn build_certificate(
    key: &PKey<Private>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "saml-idp-test").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before.timestamp()).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after.timestamp()).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn fixture() -> &'static (PKey<Private>, SigningCredentials) {
    FIXTURE.get_or_init(|| {
        let key = generate_key();
        let cert = build_certificate(
            &key,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2099, 12, 31, 0, 0, 0).unwrap(),
        );
        let credentials = SigningCredentials::new(cert, key.clone()).unwrap();
        (key, credentials)
    })
}

/// Long-lived IdP credentials shared by all unit tests
pub fn test_credentials() -> SigningCredentials {
    fixture().1.clone()
}

/// Private key matching [`test_credentials`]
pub fn test_private_key() -> PKey<Private> {
    fixture().0.clone()
}

/// Base64 DER certificate over the shared test key with the given validity
pub fn certificate_valid_between(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> String {
    let key = test_private_key();
    STANDARD.encode(build_certificate(&key, not_before, not_after).to_der().unwrap())
}

/// Currently valid certificate with a 1024-bit key
pub fn small_key_certificate() -> String {
    let key = generate_key_with_bits(1024);
    let now = Utc::now();
    let cert = build_certificate(
        &key,
        now - chrono::Duration::days(1),
        now + chrono::Duration::days(30),
    );
    STANDARD.encode(cert.to_der().unwrap())
}

/// Decrypt an `EncryptedAssertion` produced for the test key
pub fn decrypt_assertion(encrypted: &XmlElement, key: &PKey<Private>) -> String {
    let data = encrypted.child("EncryptedData").unwrap();
    let cipher_value = |el: &XmlElement| {
        let text = el.child("CipherData").unwrap().child("CipherValue").unwrap().text();
        STANDARD.decode(text.trim()).unwrap()
    };

    let encrypted_key = data.child("KeyInfo").unwrap().child("EncryptedKey").unwrap();
    let wrapped = cipher_value(encrypted_key);
    let mut decrypter = Decrypter::new(key).unwrap();
    decrypter.set_rsa_padding(Padding::PKCS1_OAEP).unwrap();
    let mut session_key = vec![0u8; decrypter.decrypt_len(&wrapped).unwrap()];
    let len = decrypter.decrypt(&wrapped, &mut session_key).unwrap();
    session_key.truncate(len);

    let payload = cipher_value(data);
    let (iv, rest) = payload.split_at(12);
    let (ciphertext, tag) = rest.split_at(rest.len() - 16);
    let plaintext = decrypt_aead(
        Cipher::aes_256_gcm(),
        &session_key,
        Some(iv),
        &[],
        ciphertext,
        tag,
    )
    .unwrap();
    String::from_utf8(plaintext).unwrap()
}
