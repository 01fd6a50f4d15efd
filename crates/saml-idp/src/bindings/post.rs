//! HTTP-POST binding: base64 form fields

use crate::error::{MessageKind, SamlError, SamlResult};
use crate::xml::{XmlLoadError, MAX_DOCUMENT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Base64 expands by 4/3; anything longer cannot decode within the document limit
const MAX_ENCODED_SIZE: usize = MAX_DOCUMENT_SIZE / 3 * 4 + 4;

pub fn encode_message(xml: &str) -> String {
    STANDARD.encode(xml.as_bytes())
}

/// Decode a base64 form value into XML text
pub fn decode_message(encoded: &str, kind: MessageKind) -> SamlResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() > MAX_ENCODED_SIZE {
        return Err(XmlLoadError::TooLarge {
            size: compact.len(),
            limit: MAX_ENCODED_SIZE,
        }
        .into());
    }

    let decoded = STANDARD
        .decode(compact)
        .map_err(|e| SamlError::invalid_message(kind, format!("base64 decode failed: {e}")))?;
    String::from_utf8(decoded)
        .map_err(|e| SamlError::invalid_message(kind, format!("invalid UTF-8: {e}")))
}
