//! Parse incoming SAML LogoutRequest documents

use super::request_parser::{
    expect_protocol_root, non_empty_attr, optional_instant, required_attr, required_id,
    required_issuer,
};
use crate::error::ParseError;
use crate::models::{LogoutRequest, NameId};
use crate::xml::XmlElement;

/// Maximum length for NameID and SessionIndex values
const MAX_NAME_ID_LENGTH: usize = 4096;

/// Build a [`LogoutRequest`] from a document loaded by the secure loader
pub fn parse_logout_request(root: &XmlElement) -> Result<LogoutRequest, ParseError> {
    expect_protocol_root(root, "LogoutRequest")?;

    let id = required_id(root)?;
    let version = required_attr(root, "Version")?.to_string();
    let issuer = required_issuer(root)?;

    let name_id_element = root
        .child("NameID")
        .ok_or(ParseError::MissingElement("NameID"))?;
    let name_id_value = name_id_element.text().trim().to_string();
    if name_id_value.is_empty() {
        return Err(ParseError::MissingElement("NameID"));
    }
    if name_id_value.len() > MAX_NAME_ID_LENGTH {
        return Err(ParseError::InvalidValue {
            field: "NameID",
            value: format!("{} characters", name_id_value.len()),
        });
    }

    let session_index = root
        .child("SessionIndex")
        .map(|el| el.text().trim().to_string())
        .filter(|v| !v.is_empty());
    if session_index
        .as_ref()
        .is_some_and(|v| v.len() > MAX_NAME_ID_LENGTH)
    {
        return Err(ParseError::InvalidValue {
            field: "SessionIndex",
            value: "too long".to_string(),
        });
    }

    Ok(LogoutRequest {
        id,
        version,
        issue_instant: optional_instant(root, "IssueInstant")?,
        issuer,
        destination: non_empty_attr(root, "Destination"),
        name_id: NameId {
            value: name_id_value,
            format: non_empty_attr(name_id_element, "Format"),
            sp_name_qualifier: non_empty_attr(name_id_element, "SPNameQualifier"),
        },
        session_index,
        not_on_or_after: optional_instant(root, "NotOnOrAfter")?,
    })
}
