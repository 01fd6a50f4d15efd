//! SAML SP session tracking for Single Logout
//!
//! Tracks which Service Providers received an assertion for each IdP session so
//! logout can find the session an SP refers to and notify every other SP.

use super::types::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An assertion issued to an SP within an IdP session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpSession {
    pub id: Uuid,
    pub subject_id: String,
    /// IdP session identifier
    pub session_id: String,
    pub sp_entity_id: String,
    pub session_index: String,
    pub name_id: String,
    pub name_id_format: String,
    pub sp_name_qualifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Trait for SP session storage
#[async_trait]
pub trait SpSessionStore: Send + Sync {
    /// Record (or refresh) the session for `(sp_entity_id, session_index)`
    async fn record(&self, session: SpSession) -> Result<(), StoreError>;

    /// Session an SP refers to by its SessionIndex
    async fn find_by_session_index(
        &self,
        sp_entity_id: &str,
        session_index: &str,
    ) -> Result<Option<SpSession>, StoreError>;

    /// Point-in-time copy of every SP session for a subject
    async fn snapshot_for_subject(&self, subject_id: &str) -> Result<Vec<SpSession>, StoreError>;

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Remove all sessions for a subject, returning how many were removed
    async fn remove_all_for_subject(&self, subject_id: &str) -> Result<u64, StoreError>;
}

/// In-memory SP session store
#[derive(Debug, Default, Clone)]
pub struct InMemorySpSessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SpSession>>>,
}

impl InMemorySpSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpSessionStore for InMemorySpSessionStore {
    async fn record(&self, session: SpSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| {
            !(existing.sp_entity_id == session.sp_entity_id
                && existing.session_index == session.session_index
                && existing.subject_id == session.subject_id)
        });
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_by_session_index(
        &self,
        sp_entity_id: &str,
        session_index: &str,
    ) -> Result<Option<SpSession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.sp_entity_id == sp_entity_id && s.session_index == session_index)
            .cloned())
    }

    async fn snapshot_for_subject(&self, subject_id: &str) -> Result<Vec<SpSession>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut snapshot: Vec<SpSession> = sessions
            .values()
            .filter(|s| s.subject_id == subject_id)
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(snapshot)
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }

    async fn remove_all_for_subject(&self, subject_id: &str) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.subject_id != subject_id);
        Ok((before - sessions.len()) as u64)
    }
}
