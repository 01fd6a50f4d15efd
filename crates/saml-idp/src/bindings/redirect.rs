//! HTTP-Redirect binding: DEFLATE, base64 and URL encoding
//!
//! Inbound queries keep every parameter's raw encoding next to its decoded value:
//! the signature covers the bytes as the SP sent them, and re-encoding a decoded
//! value is not guaranteed to reproduce them.

use crate::error::{MessageKind, SamlError, SamlResult};
use crate::saml::{SignatureAlgorithm, SigningCredentials};
use crate::xml::{XmlLoadError, MAX_DOCUMENT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Maximum encoded size for a message parameter (128 KB)
const MAX_ENCODED_SIZE: usize = 128 * 1024;

/// Maximum inflated size, aligned with the XML loader limit
const MAX_INFLATED_SIZE: usize = MAX_DOCUMENT_SIZE;

pub const RELAY_STATE: &str = "RelayState";
pub const SIG_ALG: &str = "SigAlg";
pub const SIGNATURE: &str = "Signature";

/// DEFLATE then base64 (not yet URL-encoded)
pub fn encode_message(xml: &str) -> SamlResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SamlError::Internal(format!("deflate failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SamlError::Internal(format!("deflate failed: {e}")))?;
    Ok(STANDARD.encode(compressed))
}

/// Reverse of [`encode_message`] for an already URL-decoded value
pub fn decode_message(encoded: &str, kind: MessageKind) -> SamlResult<String> {
    if encoded.len() > MAX_ENCODED_SIZE {
        return Err(XmlLoadError::TooLarge {
            size: encoded.len(),
            limit: MAX_ENCODED_SIZE,
        }
        .into());
    }

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let compressed = STANDARD
        .decode(compact)
        .map_err(|e| SamlError::invalid_message(kind, format!("base64 decode failed: {e}")))?;

    // Read one byte past the limit so oversize input is detectable
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_SIZE as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| SamlError::invalid_message(kind, format!("inflate failed: {e}")))?;

    if inflated.len() > MAX_INFLATED_SIZE {
        return Err(XmlLoadError::TooLarge {
            size: inflated.len(),
            limit: MAX_INFLATED_SIZE,
        }
        .into());
    }

    String::from_utf8(inflated)
        .map_err(|e| SamlError::invalid_message(kind, format!("invalid UTF-8: {e}")))
}

/// A query parameter as received and as decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub raw: String,
    pub value: String,
}

/// Parsed HTTP-Redirect query string
#[derive(Debug, Clone, Default)]
pub struct RedirectQuery {
    /// `SAMLRequest` or `SAMLResponse`
    pub message_parameter: &'static str,
    pub message: Option<QueryParam>,
    pub relay_state: Option<QueryParam>,
    pub sig_alg: Option<QueryParam>,
    pub signature: Option<QueryParam>,
}

impl RedirectQuery {
    /// Split `raw_query` without normalizing it. The first occurrence of a
    /// parameter wins.
    pub fn parse(raw_query: &str, message_parameter: &'static str) -> Self {
        let mut query = RedirectQuery {
            message_parameter,
            ..Self::default()
        };

        for segment in raw_query.split('&').filter(|s| !s.is_empty()) {
            let (name, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
            let value = url::form_urlencoded::parse(format!("v={raw_value}").as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            let param = QueryParam {
                raw: raw_value.to_string(),
                value,
            };

            let slot = match name {
                n if n == message_parameter => &mut query.message,
                RELAY_STATE => &mut query.relay_state,
                SIG_ALG => &mut query.sig_alg,
                SIGNATURE => &mut query.signature,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(param);
            }
        }

        query
    }

    pub fn message_value(&self) -> Option<&str> {
        self.message.as_ref().map(|p| p.value.as_str())
    }

    pub fn relay_state_value(&self) -> Option<&str> {
        self.relay_state.as_ref().map(|p| p.value.as_str())
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some() || self.sig_alg.is_some()
    }

    /// The exact octets covered by the query signature:
    /// `<message>=..[&RelayState=..]&SigAlg=..` using the received encodings
    pub fn signed_content(&self) -> Option<String> {
        let message = self.message.as_ref()?;
        let sig_alg = self.sig_alg.as_ref()?;

        let mut content = format!("{}={}", self.message_parameter, message.raw);
        if let Some(relay_state) = &self.relay_state {
            content.push_str("&RelayState=");
            content.push_str(&relay_state.raw);
        }
        content.push_str("&SigAlg=");
        content.push_str(&sig_alg.raw);
        Some(content)
    }
}

/// Encode, sign and serialize an outbound message as a query string
pub fn build_signed_query(
    parameter: &str,
    xml: &str,
    relay_state: Option<&str>,
    credentials: &SigningCredentials,
) -> SamlResult<String> {
    let encoded = encode_message(xml)?;
    let mut query = format!("{}={}", parameter, urlencoding::encode(&encoded));
    if let Some(relay_state) = relay_state {
        query.push_str("&RelayState=");
        query.push_str(&urlencoding::encode(relay_state));
    }
    sign_query(query, credentials)
}

/// Append `&SigAlg=..&Signature=..` to an already URL-encoded parameter string
pub fn sign_query(mut query: String, credentials: &SigningCredentials) -> SamlResult<String> {
    let algorithm = SignatureAlgorithm::RsaSha256;
    query.push_str("&SigAlg=");
    query.push_str(&urlencoding::encode(algorithm.uri()));

    let signature = credentials.sign(algorithm, query.as_bytes())?;
    query.push_str("&Signature=");
    query.push_str(&urlencoding::encode(&STANDARD.encode(signature)));
    Ok(query)
}

/// Append a query string to a URL that may already carry one
pub fn append_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}
