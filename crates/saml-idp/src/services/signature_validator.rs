//! Inbound message signature validation
//!
//! Validates SAML message signatures for both HTTP-Redirect (query signature over
//! the received encoding) and HTTP-POST (enveloped XML-DSig) bindings. Failure
//! details are logged; callers only ever see a [`SignatureFailure`].

use crate::bindings::redirect::RedirectQuery;
use crate::bindings::InboundMessage;
use crate::error::{SamlError, SamlResult, SignatureFailure};
use crate::models::ServiceProvider;
use crate::saml::constants::algorithms;
use crate::saml::{usable_rsa_key, verify_with_any, SignatureAlgorithm};
use crate::xml::{canonicalize, C14nOptions, XmlElement, EXCLUSIVE_C14N};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Public};

/// Any RSA key size is accepted for verification
const MIN_VERIFY_KEY_BITS: u32 = 0;

/// Service for validating SAML message signatures
pub struct SignatureValidator;

impl SignatureValidator {
    /// Public keys of the SP's signing certificates that are usable at `now`, in
    /// configured order. An SP without any is a configuration error.
    pub fn trusted_keys(sp: &ServiceProvider, now: DateTime<Utc>) -> SamlResult<Vec<PKey<Public>>> {
        let keys: Vec<PKey<Public>> = sp
            .signing_certificates
            .iter()
            .filter_map(|cert| usable_rsa_key(cert, now, MIN_VERIFY_KEY_BITS))
            .collect();

        if keys.is_empty() {
            tracing::warn!(
                sp = %sp.entity_id,
                configured = sp.signing_certificates.len(),
                "No usable signing certificate for service provider"
            );
            return Err(SamlError::NoValidSigningCertificates(sp.entity_id.clone()));
        }
        Ok(keys)
    }

    /// Validate an HTTP-Redirect query signature
    pub fn validate_redirect(
        query: &RedirectQuery,
        keys: &[PKey<Public>],
    ) -> Result<(), SignatureFailure> {
        let (Some(sig_alg), Some(signature)) = (&query.sig_alg, &query.signature) else {
            return Err(reject(
                SignatureFailure::MissingParameter,
                "SigAlg or Signature parameter absent",
            ));
        };

        let algorithm = SignatureAlgorithm::from_uri(&sig_alg.value).ok_or_else(|| {
            reject(
                SignatureFailure::UnsupportedAlgorithm,
                &format!("SigAlg {}", sig_alg.value),
            )
        })?;

        let signed_content = query.signed_content().ok_or_else(|| {
            reject(SignatureFailure::MissingParameter, "message parameter absent")
        })?;

        let signature_bytes = decode_base64(&signature.value)
            .ok_or_else(|| reject(SignatureFailure::Invalid, "signature is not base64"))?;

        if verify_with_any(keys, algorithm, signed_content.as_bytes(), &signature_bytes) {
            Ok(())
        } else {
            Err(reject(
                SignatureFailure::Invalid,
                "no configured certificate verifies the query signature",
            ))
        }
    }

    /// Validate the enveloped signature of an HTTP-POST message root
    pub fn validate_post(
        document: &XmlElement,
        keys: &[PKey<Public>],
    ) -> Result<(), SignatureFailure> {
        Self::validate_enveloped(document, document, keys)
    }

    /// Validate the enveloped signature carried by `signed`, an element of
    /// `document`
    pub fn validate_enveloped(
        document: &XmlElement,
        signed: &XmlElement,
        keys: &[PKey<Public>],
    ) -> Result<(), SignatureFailure> {
        let signature = find_signature(signed).ok_or_else(|| {
            reject(SignatureFailure::ElementNotFound, "no enveloped Signature element")
        })?;

        let element_id = signed
            .attr("ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| reject(SignatureFailure::Invalid, "signed element has no ID"))?;

        let same_id = document
            .descendants()
            .into_iter()
            .filter(|el| el.attr("ID") == Some(element_id))
            .count();
        if same_id != 1 {
            return Err(reject(
                SignatureFailure::Invalid,
                &format!("ID {element_id} occurs {same_id} times"),
            ));
        }

        let signed_info = signature
            .child("SignedInfo")
            .ok_or_else(|| reject(SignatureFailure::Invalid, "SignedInfo missing"))?;

        let c14n_method = signed_info
            .child("CanonicalizationMethod")
            .ok_or_else(|| reject(SignatureFailure::Invalid, "CanonicalizationMethod missing"))?;
        if c14n_method.attr("Algorithm") != Some(EXCLUSIVE_C14N) {
            return Err(reject(
                SignatureFailure::UnsupportedAlgorithm,
                "SignedInfo canonicalization is not exclusive c14n",
            ));
        }

        let algorithm = signed_info
            .child("SignatureMethod")
            .and_then(|m| m.attr("Algorithm"))
            .and_then(SignatureAlgorithm::from_uri)
            .ok_or_else(|| {
                reject(SignatureFailure::UnsupportedAlgorithm, "SignatureMethod not accepted")
            })?;

        let mut references = signed_info.children_named("Reference");
        let reference = match (references.next(), references.next()) {
            (Some(reference), None) => reference,
            _ => {
                return Err(reject(
                    SignatureFailure::Invalid,
                    "SignedInfo must carry exactly one Reference",
                ))
            }
        };

        let uri = reference.attr("URI").unwrap_or("");
        if uri.is_empty() || uri.strip_prefix('#') != Some(element_id) {
            return Err(reject(
                SignatureFailure::Invalid,
                &format!("Reference URI '{uri}' does not point at #{element_id}"),
            ));
        }

        let inclusive_prefixes = reference_transforms(reference)?;

        let digest = match reference.child("DigestMethod").and_then(|m| m.attr("Algorithm")) {
            Some(algorithms::DIGEST_SHA256) => MessageDigest::sha256(),
            Some(algorithms::DIGEST_SHA512) => MessageDigest::sha512(),
            other => {
                return Err(reject(
                    SignatureFailure::UnsupportedAlgorithm,
                    &format!("DigestMethod {other:?}"),
                ))
            }
        };

        let expected_digest = reference
            .child("DigestValue")
            .and_then(|el| decode_base64(&el.text()))
            .ok_or_else(|| reject(SignatureFailure::Invalid, "DigestValue missing or not base64"))?;

        let canonical = canonicalize(
            document,
            signed,
            &C14nOptions {
                exclude: Some(signature),
                inclusive_prefixes: &inclusive_prefixes,
            },
        )
        .map_err(|e| reject(SignatureFailure::Invalid, &format!("signed element: {e}")))?;

        let actual_digest = hash(digest, canonical.as_bytes())
            .map_err(|e| reject(SignatureFailure::Invalid, &format!("digest failed: {e}")))?;
        if actual_digest.len() != expected_digest.len()
            || !openssl::memcmp::eq(&actual_digest, &expected_digest)
        {
            return Err(reject(SignatureFailure::Invalid, "digest mismatch"));
        }

        let signed_info_prefixes = inclusive_prefix_list(c14n_method);
        let canonical_signed_info = canonicalize(
            document,
            signed_info,
            &C14nOptions {
                exclude: None,
                inclusive_prefixes: &signed_info_prefixes,
            },
        )
        .map_err(|e| reject(SignatureFailure::Invalid, &format!("SignedInfo: {e}")))?;

        let signature_value = signature
            .child("SignatureValue")
            .and_then(|el| decode_base64(&el.text()))
            .ok_or_else(|| {
                reject(SignatureFailure::Invalid, "SignatureValue missing or not base64")
            })?;

        if verify_with_any(
            keys,
            algorithm,
            canonical_signed_info.as_bytes(),
            &signature_value,
        ) {
            Ok(())
        } else {
            Err(reject(
                SignatureFailure::Invalid,
                "no configured certificate verifies SignedInfo",
            ))
        }
    }

    /// Apply the SP's signature policy to an inbound request. A required
    /// signature must be present and valid. An optional one is verified when it
    /// is present and the SP has usable certificates, and ignored otherwise.
    pub fn enforce(
        message: &InboundMessage,
        document: &XmlElement,
        sp: &ServiceProvider,
        required: bool,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let keys = if required {
            Self::trusted_keys(sp, now)?
        } else {
            let signed = match message {
                InboundMessage::Redirect(query) => query.is_signed(),
                InboundMessage::Post { .. } => find_signature(document).is_some(),
            };
            if !signed {
                return Ok(());
            }
            let keys: Vec<PKey<Public>> = sp
                .signing_certificates
                .iter()
                .filter_map(|cert| usable_rsa_key(cert, now, MIN_VERIFY_KEY_BITS))
                .collect();
            if keys.is_empty() {
                tracing::debug!(sp = %sp.entity_id, "Ignoring signature without trust material");
                return Ok(());
            }
            keys
        };

        let verified = match message {
            InboundMessage::Redirect(query) => Self::validate_redirect(query, &keys),
            InboundMessage::Post { .. } => Self::validate_post(document, &keys),
        };
        verified.map_err(SamlError::SignatureRejected)?;
        tracing::debug!(sp = %sp.entity_id, "Request signature validated");
        Ok(())
    }
}

/// Direct `Signature` child of `element`
pub fn find_signature(element: &XmlElement) -> Option<&XmlElement> {
    element.child("Signature")
}

/// Only the enveloped-signature and exclusive c14n transforms are accepted.
/// Returns the InclusiveNamespaces prefix list of the c14n transform.
fn reference_transforms(reference: &XmlElement) -> Result<Vec<String>, SignatureFailure> {
    let mut prefixes = Vec::new();
    let Some(transforms) = reference.child("Transforms") else {
        return Ok(prefixes);
    };
    for transform in transforms.children_named("Transform") {
        match transform.attr("Algorithm") {
            Some(algorithms::ENVELOPED_SIGNATURE) => {}
            Some(EXCLUSIVE_C14N) => prefixes = inclusive_prefix_list(transform),
            other => {
                return Err(reject(
                    SignatureFailure::UnsupportedAlgorithm,
                    &format!("Transform {other:?}"),
                ))
            }
        }
    }
    Ok(prefixes)
}

fn inclusive_prefix_list(element: &XmlElement) -> Vec<String> {
    element
        .child("InclusiveNamespaces")
        .and_then(|el| el.attr("PrefixList"))
        .map(|list| list.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

fn reject(failure: SignatureFailure, detail: &str) -> SignatureFailure {
    tracing::warn!(failure = %failure, detail = %detail, "SAML signature rejected");
    failure
}
