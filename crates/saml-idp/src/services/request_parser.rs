//! SAML `AuthnRequest` parsing service

use crate::error::ParseError;
use crate::models::{
    AuthnContextComparison, AuthnRequest, NameIdPolicy, RequestedAuthnContext,
};
use crate::saml::constants::PROTOCOL_NS;
use crate::xml::XmlElement;
use chrono::{DateTime, Utc};

/// Maximum length for the request ID attribute
const MAX_REQUEST_ID_LENGTH: usize = 256;

/// Maximum length for the Issuer element value
const MAX_ISSUER_LENGTH: usize = 1024;

/// Service for parsing SAML `AuthnRequest` messages
pub struct RequestParser;

impl RequestParser {
    /// Build an [`AuthnRequest`] from a document loaded by the secure loader
    pub fn parse(root: &XmlElement) -> Result<AuthnRequest, ParseError> {
        expect_protocol_root(root, "AuthnRequest")?;

        let id = required_id(root)?;
        let version = required_attr(root, "Version")?.to_string();
        let issue_instant = parse_instant("IssueInstant", required_attr(root, "IssueInstant")?)?;
        let issuer = required_issuer(root)?;

        let assertion_consumer_service_index = root
            .attr("AssertionConsumerServiceIndex")
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| ParseError::InvalidValue {
                    field: "AssertionConsumerServiceIndex",
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        Ok(AuthnRequest {
            id,
            version,
            issue_instant,
            issuer,
            destination: non_empty_attr(root, "Destination"),
            assertion_consumer_service_url: non_empty_attr(root, "AssertionConsumerServiceURL"),
            assertion_consumer_service_index,
            protocol_binding: non_empty_attr(root, "ProtocolBinding"),
            force_authn: optional_bool(root, "ForceAuthn")?.unwrap_or(false),
            is_passive: optional_bool(root, "IsPassive")?.unwrap_or(false),
            name_id_policy: parse_name_id_policy(root)?,
            requested_authn_context: parse_requested_authn_context(root)?,
        })
    }
}

fn parse_name_id_policy(root: &XmlElement) -> Result<Option<NameIdPolicy>, ParseError> {
    let Some(policy) = root.child("NameIDPolicy") else {
        return Ok(None);
    };
    Ok(Some(NameIdPolicy {
        format: non_empty_attr(policy, "Format"),
        sp_name_qualifier: non_empty_attr(policy, "SPNameQualifier"),
        allow_create: optional_bool(policy, "AllowCreate")?,
    }))
}

fn parse_requested_authn_context(
    root: &XmlElement,
) -> Result<Option<RequestedAuthnContext>, ParseError> {
    let Some(context) = root.child("RequestedAuthnContext") else {
        return Ok(None);
    };

    let comparison = match context.attr("Comparison") {
        None => AuthnContextComparison::default(),
        Some(raw) => AuthnContextComparison::parse(raw)
            .ok_or_else(|| ParseError::UnknownComparison(raw.to_string()))?,
    };

    let class_refs: Vec<String> = context
        .children_named("AuthnContextClassRef")
        .map(|el| el.text().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    if class_refs.is_empty() {
        return Err(ParseError::EmptyAuthnContext);
    }

    Ok(Some(RequestedAuthnContext {
        comparison,
        class_refs,
    }))
}

/// The root must be `<local_name>` in the SAML 2.0 protocol namespace
pub(crate) fn expect_protocol_root(
    root: &XmlElement,
    local_name: &'static str,
) -> Result<(), ParseError> {
    if root.local_name() != local_name {
        return Err(ParseError::UnexpectedRoot {
            expected: local_name,
            found: root.local_name().to_string(),
        });
    }
    let prefix = root.prefix().unwrap_or("");
    let in_protocol_ns = root
        .namespace_declarations()
        .any(|(declared, uri)| declared == prefix && uri == PROTOCOL_NS);
    if !in_protocol_ns {
        return Err(ParseError::WrongNamespace);
    }
    Ok(())
}

pub(crate) fn required_attr<'a>(
    element: &'a XmlElement,
    name: &'static str,
) -> Result<&'a str, ParseError> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingAttribute(name))
}

pub(crate) fn required_id(root: &XmlElement) -> Result<String, ParseError> {
    let id = required_attr(root, "ID")?;
    if id.len() > MAX_REQUEST_ID_LENGTH {
        return Err(ParseError::InvalidValue {
            field: "ID",
            value: format!("{} characters", id.len()),
        });
    }
    Ok(id.to_string())
}

pub(crate) fn required_issuer(root: &XmlElement) -> Result<String, ParseError> {
    let issuer = root
        .child("Issuer")
        .map(|el| el.text().trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingElement("Issuer"))?;
    if issuer.len() > MAX_ISSUER_LENGTH {
        return Err(ParseError::InvalidValue {
            field: "Issuer",
            value: format!("{} characters", issuer.len()),
        });
    }
    Ok(issuer)
}

pub(crate) fn non_empty_attr(element: &XmlElement, name: &str) -> Option<String> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

pub(crate) fn parse_instant(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidValue {
            field,
            value: raw.to_string(),
        })
}

pub(crate) fn optional_instant(
    element: &XmlElement,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    element
        .attr(field)
        .filter(|v| !v.trim().is_empty())
        .map(|raw| parse_instant(field, raw))
        .transpose()
}

fn optional_bool(element: &XmlElement, field: &'static str) -> Result<Option<bool>, ParseError> {
    match element.attr(field).map(str::trim) {
        None => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(other) => Err(ParseError::InvalidValue {
            field,
            value: other.to_string(),
        }),
    }
}
