//! One-time stores for sign-in state and deferred logout messages.
//!
//! `take_once` is a single retrieve-and-delete operation. Implementations over shared
//! storage must provide it atomically (e.g. `GETDEL` or compare-and-delete); a read
//! followed by a separate delete would let two concurrent callers both succeed.

use super::types::{LogoutMessage, SigninState, StoreEntry, StoreError};
use crate::clock::Clock;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on parked entries per in-memory store
const MAX_ENTRIES: u64 = 100_000;

/// Write-once, read-once keyed store
#[async_trait]
pub trait OneTimeStore<V: StoreEntry>: Send + Sync {
    /// Park `value`, returning its opaque key
    async fn put(&self, value: V) -> Result<String, StoreError>;

    /// Atomically retrieve and delete. Unknown, expired or already-taken keys are
    /// `NotFound`.
    async fn take_once(&self, key: &str) -> Result<V, StoreError>;

    /// Drop every entry carrying `tag`
    async fn invalidate_tag(&self, tag: &str) -> Result<(), StoreError>;
}

pub type SigninStateStore = dyn OneTimeStore<SigninState>;
pub type LogoutMessageStore = dyn OneTimeStore<LogoutMessage>;

/// In-process store on top of `moka`. TTL eviction bounds memory; expiry is also
/// checked against the injected clock on every take.
pub struct InMemoryOneTimeStore<V: StoreEntry> {
    cache: Cache<String, V>,
    clock: Arc<dyn Clock>,
}

impl<V: StoreEntry> InMemoryOneTimeStore<V> {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { cache, clock }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<V: StoreEntry> OneTimeStore<V> for InMemoryOneTimeStore<V> {
    async fn put(&self, value: V) -> Result<String, StoreError> {
        let key = Uuid::new_v4().to_string();
        self.cache.insert(key.clone(), value).await;
        Ok(key)
    }

    async fn take_once(&self, key: &str) -> Result<V, StoreError> {
        let value = self
            .cache
            .remove(key)
            .await
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if self.clock.now() > value.expires_at() {
            tracing::debug!(key = %key, "Discarding expired one-time entry");
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(value)
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<(), StoreError> {
        let stale: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, value)| value.tag() == tag)
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.cache.invalidate(key.as_str()).await;
        }
        tracing::debug!(tag = %tag, count = stale.len(), "Invalidated one-time entries");
        Ok(())
    }
}
