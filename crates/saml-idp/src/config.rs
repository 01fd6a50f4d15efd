//! IdP-wide options, constructed once and shared read-only

use crate::saml::constants::{claim_types, nameid, ATTRNAME_FORMAT_URI};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SIGNIN_PATH: &str = "/saml/signin";
pub const SIGNIN_CALLBACK_PATH: &str = "/saml/signin/callback";
pub const LOGOUT_PATH: &str = "/saml/logout";
pub const LOGOUT_CALLBACK_PATH: &str = "/saml/logout/callback";
pub const IDP_INITIATED_PATH: &str = "/saml/idp-initiated";
pub const IDP_LOGOUT_PATH: &str = "/saml/idp-logout";
pub const METADATA_PATH: &str = "/saml/metadata";

/// Options for the SAML IdP engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlIdpOptions {
    /// EntityID advertised in metadata and used as `Issuer`
    pub entity_id: String,

    /// Public base URL the SAML endpoints are mounted under
    pub base_url: String,

    /// External login step; receives `returnUrl`
    pub login_url: String,

    /// External consent step; receives `returnUrl`
    pub consent_url: String,

    pub supported_name_id_formats: Vec<String>,

    /// Claim type -> SAML attribute name, applied when the SP has no override
    pub default_claim_mappings: BTreeMap<String, String>,

    pub default_persistent_name_identifier_claim_type: Option<String>,

    /// NameFormat stamped on every emitted Attribute
    pub attribute_name_format: String,

    pub max_relay_state_length: usize,

    pub metadata_validity_secs: u64,

    pub want_authn_requests_signed: bool,

    pub signin_state_ttl_secs: u64,

    pub logout_message_ttl_secs: u64,

    /// Fallback when the SP does not set `request_max_age_secs`
    pub default_request_max_age_secs: u64,

    /// Fallback when the SP does not set `clock_skew_secs`
    pub default_clock_skew_secs: u64,

    /// Cookie carrying the pending sign-in StateId between signin and callback
    pub state_cookie_name: String,
}

impl Default for SamlIdpOptions {
    fn default() -> Self {
        Self {
            entity_id: "http://localhost:8080/saml/metadata".to_string(),
            base_url: "http://localhost:8080".to_string(),
            login_url: "http://localhost:8080/account/login".to_string(),
            consent_url: "http://localhost:8080/account/consent".to_string(),
            supported_name_id_formats: vec![
                nameid::UNSPECIFIED.to_string(),
                nameid::EMAIL.to_string(),
                nameid::PERSISTENT.to_string(),
                nameid::TRANSIENT.to_string(),
            ],
            default_claim_mappings: default_claim_mappings(),
            default_persistent_name_identifier_claim_type: None,
            attribute_name_format: ATTRNAME_FORMAT_URI.to_string(),
            max_relay_state_length: 80,
            metadata_validity_secs: 7 * 24 * 3600,
            want_authn_requests_signed: false,
            signin_state_ttl_secs: 600,
            logout_message_ttl_secs: 600,
            default_request_max_age_secs: 300,
            default_clock_skew_secs: 300,
            state_cookie_name: "saml_signin_state".to_string(),
        }
    }
}

fn default_claim_mappings() -> BTreeMap<String, String> {
    [
        (claim_types::EMAIL, "urn:oid:0.9.2342.19200300.100.1.3"),
        (claim_types::NAME, "urn:oid:2.16.840.1.113730.3.1.241"),
        (claim_types::GIVEN_NAME, "urn:oid:2.5.4.42"),
        (claim_types::FAMILY_NAME, "urn:oid:2.5.4.4"),
        (
            claim_types::ROLE,
            "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
        ),
    ]
    .into_iter()
    .map(|(claim, attribute)| (claim.to_string(), attribute.to_string()))
    .collect()
}

impl SamlIdpOptions {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// SSO endpoint; inbound `Destination` must match it exactly
    pub fn signin_url(&self) -> String {
        self.endpoint(SIGNIN_PATH)
    }

    pub fn signin_callback_url(&self) -> String {
        self.endpoint(SIGNIN_CALLBACK_PATH)
    }

    /// SLO endpoint; inbound `Destination` must match it exactly
    pub fn logout_url(&self) -> String {
        self.endpoint(LOGOUT_PATH)
    }

    pub fn logout_callback_url(&self) -> String {
        self.endpoint(LOGOUT_CALLBACK_PATH)
    }

    pub fn metadata_url(&self) -> String {
        self.endpoint(METADATA_PATH)
    }

    pub fn signin_state_ttl(&self) -> Duration {
        seconds(self.signin_state_ttl_secs)
    }

    pub fn logout_message_ttl(&self) -> Duration {
        seconds(self.logout_message_ttl_secs)
    }

    pub fn metadata_validity(&self) -> Duration {
        seconds(self.metadata_validity_secs)
    }

    pub fn default_request_max_age(&self) -> Duration {
        seconds(self.default_request_max_age_secs)
    }

    pub fn default_clock_skew(&self) -> Duration {
        seconds(self.default_clock_skew_secs)
    }

    pub fn supports_name_id_format(&self, format: &str) -> bool {
        self.supported_name_id_formats.iter().any(|f| f == format)
    }
}

/// Seconds to `chrono::Duration`, saturating at `i64::MAX` seconds
pub(crate) fn seconds(secs: u64) -> Duration {
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}
