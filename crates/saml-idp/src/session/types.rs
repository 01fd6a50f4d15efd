//! Intermediate protocol state parked between a request and its resumption

use crate::models::AuthnRequest;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store errors. Replays surface as `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Entry kept in a one-time store
pub trait StoreEntry: Clone + Send + Sync + 'static {
    /// Tag used for bulk invalidation (the owning SP's EntityID)
    fn tag(&self) -> &str;

    fn expires_at(&self) -> DateTime<Utc>;
}

/// What the pending sign-in waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionStep {
    Login,
    Consent,
}

/// A validated AuthnRequest waiting for the login/consent step to finish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninState {
    pub request: AuthnRequest,
    pub sp_entity_id: String,
    /// ACS URL resolved during validation
    pub acs_url: String,
    pub relay_state: Option<String>,
    pub awaiting: InteractionStep,
    /// Requested-context outcome when already known at signin time
    pub requested_context_satisfied: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SigninState {
    pub fn new(
        request: AuthnRequest,
        acs_url: String,
        relay_state: Option<String>,
        awaiting: InteractionStep,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sp_entity_id: request.issuer.clone(),
            request,
            acs_url,
            relay_state,
            awaiting,
            requested_context_satisfied: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

impl StoreEntry for SigninState {
    fn tag(&self) -> &str {
        &self.sp_entity_id
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Deferred completion of an SP-initiated logout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutMessage {
    pub subject_id: String,
    pub session_id: String,
    pub sp_entity_id: String,
    /// ID of the SP's LogoutRequest, echoed as `InResponseTo`
    pub request_id: String,
    pub relay_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoreEntry for LogoutMessage {
    fn tag(&self) -> &str {
        &self.sp_entity_id
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
