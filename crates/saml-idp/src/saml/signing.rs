//! IdP signing credentials and SP certificate handling

use crate::error::{SamlError, SamlResult};
use crate::saml::constants::algorithms;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use std::cmp::Ordering;

/// RSA signature algorithms accepted on inbound messages and used outbound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha512,
}

impl SignatureAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => algorithms::RSA_SHA256,
            SignatureAlgorithm::RsaSha512 => algorithms::RSA_SHA512,
        }
    }

    /// SHA-1 and every other algorithm map to `None`
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithms::RSA_SHA256 => Some(SignatureAlgorithm::RsaSha256),
            algorithms::RSA_SHA512 => Some(SignatureAlgorithm::RsaSha512),
            _ => None,
        }
    }

    pub fn digest(self) -> MessageDigest {
        match self {
            SignatureAlgorithm::RsaSha256 => MessageDigest::sha256(),
            SignatureAlgorithm::RsaSha512 => MessageDigest::sha512(),
        }
    }
}

/// IdP certificate and private key
#[derive(Clone)]
pub struct SigningCredentials {
    certificate: X509,
    private_key: PKey<Private>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("subject", &self.certificate.subject_name())
            .finish_non_exhaustive()
    }
}

impl SigningCredentials {
    /// Pair a certificate with its private key; the two must match
    pub fn new(certificate: X509, private_key: PKey<Private>) -> SamlResult<Self> {
        let public_key = certificate
            .public_key()
            .map_err(|e| SamlError::SigningCredentials(format!("certificate key: {e}")))?;
        if !public_key.public_eq(&private_key) {
            return Err(SamlError::SigningCredentials(
                "private key does not match certificate".to_string(),
            ));
        }
        if private_key.id() != Id::RSA {
            return Err(SamlError::SigningCredentials(
                "signing key must be RSA".to_string(),
            ));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> SamlResult<Self> {
        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .map_err(|e| SamlError::SigningCredentials(format!("certificate: {e}")))?;
        let private_key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| SamlError::SigningCredentials(format!("private key: {e}")))?;
        Self::new(certificate, private_key)
    }

    /// RSA PKCS#1 v1.5 signature; deterministic for a given key and input
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> SamlResult<Vec<u8>> {
        let mut signer = Signer::new(algorithm.digest(), &self.private_key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// Leaf certificate as base64 DER, the `X509Certificate` element content
    pub fn certificate_base64_der(&self) -> SamlResult<String> {
        Ok(STANDARD.encode(self.certificate.to_der()?))
    }
}

/// Source of the IdP's current signing credentials
#[async_trait]
pub trait SigningCredentialProvider: Send + Sync {
    async fn signing_credentials(&self) -> SamlResult<SigningCredentials>;
}

/// Provider for a single, fixed key pair
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: SigningCredentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: SigningCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SigningCredentialProvider for StaticCredentialProvider {
    async fn signing_credentials(&self) -> SamlResult<SigningCredentials> {
        Ok(self.credentials.clone())
    }
}

/// Parse a certificate given as PEM or as bare base64 DER
pub fn parse_certificate(encoded: &str) -> Option<X509> {
    if encoded.contains("-----BEGIN CERTIFICATE-----") {
        return X509::from_pem(encoded.as_bytes()).ok();
    }
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let der = STANDARD.decode(compact).ok()?;
    X509::from_der(&der).ok()
}

/// Whether `now` falls inside the certificate's validity window
pub fn is_currently_valid(certificate: &X509, now: DateTime<Utc>) -> bool {
    let Ok(now) = Asn1Time::from_unix(now.timestamp()) else {
        return false;
    };
    let started = matches!(
        certificate.not_before().compare(&now),
        Ok(Ordering::Less | Ordering::Equal)
    );
    let not_expired = matches!(
        certificate.not_after().compare(&now),
        Ok(Ordering::Greater | Ordering::Equal)
    );
    started && not_expired
}

/// Public key of a configured certificate if it is valid now, RSA-keyed, and at
/// least `min_bits` long
pub fn usable_rsa_key(encoded: &str, now: DateTime<Utc>, min_bits: u32) -> Option<PKey<Public>> {
    let certificate = parse_certificate(encoded)?;
    if !is_currently_valid(&certificate, now) {
        return None;
    }
    let key = certificate.public_key().ok()?;
    (key.id() == Id::RSA && key.bits() >= min_bits).then_some(key)
}

/// Like [`usable_rsa_key`] but returns the certificate alongside the key
pub fn usable_rsa_certificate(
    encoded: &str,
    now: DateTime<Utc>,
    min_bits: u32,
) -> Option<(X509, PKey<Public>)> {
    let certificate = parse_certificate(encoded)?;
    if !is_currently_valid(&certificate, now) {
        return None;
    }
    let key = certificate.public_key().ok()?;
    (key.id() == Id::RSA && key.bits() >= min_bits).then_some((certificate, key))
}

/// Verify `signature` over `data` with the first key that accepts it
pub fn verify_with_any(
    keys: &[PKey<Public>],
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> bool {
    keys.iter().any(|key| {
        let verified = Verifier::new(algorithm.digest(), key).and_then(|mut verifier| {
            verifier.update(data)?;
            verifier.verify(signature)
        });
        matches!(verified, Ok(true))
    })
}
