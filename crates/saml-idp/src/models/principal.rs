//! Authenticated principal handed over by the host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single claim; the same type may repeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// The signed-in user as established by the host's authentication step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Primary identifier, used for the `unspecified` NameID format
    pub subject_id: String,

    /// IdP session identifier, emitted as `SessionIndex`
    pub session_id: String,

    pub authn_instant: DateTime<Utc>,

    #[serde(default)]
    pub authn_context_class_ref: Option<String>,

    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl Principal {
    pub fn new(
        subject_id: impl Into<String>,
        session_id: impl Into<String>,
        authn_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            session_id: session_id.into(),
            authn_instant,
            authn_context_class_ref: None,
            claims: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push(Claim::new(claim_type, value));
        self
    }

    /// First non-empty value of the given claim type
    pub fn claim(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .filter(|c| c.claim_type == claim_type)
            .map(|c| c.value.trim())
            .find(|v| !v.is_empty())
    }
}
