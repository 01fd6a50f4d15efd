//! Typed inbound protocol messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `samlp:NameIDPolicy`. Wrapped in `Option` by its owner so an empty element
/// (`Some` with all fields `None`) stays distinct from an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    pub format: Option<String>,
    pub sp_name_qualifier: Option<String>,
    pub allow_create: Option<bool>,
}

/// `Comparison` attribute of `RequestedAuthnContext`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthnContextComparison {
    #[default]
    Exact,
    Minimum,
    Maximum,
    Better,
}

impl AuthnContextComparison {
    /// Case-insensitive parse; `None` for unknown values
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "minimum" => Some(Self::Minimum),
            "maximum" => Some(Self::Maximum),
            "better" => Some(Self::Better),
            _ => None,
        }
    }
}

/// `samlp:RequestedAuthnContext`; `class_refs` is never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAuthnContext {
    pub comparison: AuthnContextComparison,
    pub class_refs: Vec<String>,
}

/// Parsed `samlp:AuthnRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    pub id: String,
    pub version: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub destination: Option<String>,
    pub assertion_consumer_service_url: Option<String>,
    pub assertion_consumer_service_index: Option<u32>,
    pub protocol_binding: Option<String>,
    pub force_authn: bool,
    pub is_passive: bool,
    pub name_id_policy: Option<NameIdPolicy>,
    pub requested_authn_context: Option<RequestedAuthnContext>,
}

impl AuthnRequest {
    /// NameID format requested through `NameIDPolicy`, if any
    pub fn requested_name_id_format(&self) -> Option<&str> {
        self.name_id_policy
            .as_ref()
            .and_then(|policy| policy.format.as_deref())
    }
}

/// `saml:NameID` as carried by a `LogoutRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    pub value: String,
    pub format: Option<String>,
    pub sp_name_qualifier: Option<String>,
}

/// Parsed `samlp:LogoutRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub id: String,
    pub version: String,
    pub issue_instant: Option<DateTime<Utc>>,
    pub issuer: String,
    pub destination: Option<String>,
    pub name_id: NameId,
    pub session_index: Option<String>,
    pub not_on_or_after: Option<DateTime<Utc>>,
}
