//! Context Store
//!
//! Persistence seam for [`ConversationContext`] records, keyed by session id.

use super::model::ConversationContext;
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Storage for per-session context records.
///
/// Writes are optimistic: `put` succeeds only when the stored version equals
/// `context.version` (0 for a record that was never stored) and returns the
/// stored copy with its version bumped.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationContext>>;

    async fn put(&self, context: &ConversationContext) -> Result<ConversationContext>;

    /// Move the record's expiry to `expires_at` if that is later.
    /// Returns false when the session has no record.
    async fn extend_ttl(&self, session_id: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Remove every record whose expiry is at or before `now`
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// In-process store backed by a map. Suitable for tests and single-node
/// deployments that do not need the context to survive restarts.
#[derive(Default)]
pub struct MemoryContextStore {
    contexts: Mutex<HashMap<String, ConversationContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.contexts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.lock().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationContext>> {
        Ok(self.contexts.lock().await.get(session_id).cloned())
    }

    async fn put(&self, context: &ConversationContext) -> Result<ConversationContext> {
        let mut contexts = self.contexts.lock().await;
        let found = contexts
            .get(&context.session_id)
            .map(|stored| stored.version)
            .unwrap_or(0);

        if found != context.version {
            return Err(FlowError::VersionConflict {
                session_id: context.session_id.clone(),
                expected: context.version,
                found,
            });
        }

        let mut stored = context.clone();
        stored.version += 1;
        contexts.insert(stored.session_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn extend_ttl(&self, session_id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let mut contexts = self.contexts.lock().await;
        match contexts.get_mut(session_id) {
            Some(stored) => {
                if expires_at > stored.expires_at {
                    stored.expires_at = expires_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.contexts.lock().await.remove(session_id).is_some())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut contexts = self.contexts.lock().await;
        let before = contexts.len();
        contexts.retain(|_, ctx| !ctx.is_expired(now));
        let removed = (before - contexts.len()) as u64;
        if removed > 0 {
            tracing::info!("Cleaned up {} expired context(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_context(session_id: &str, now: DateTime<Utc>) -> ConversationContext {
        ConversationContext::new(session_id, "tenant", "user", now, Duration::minutes(120))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryContextStore::new();
        let ctx = new_context("s1", Utc::now());

        let stored = store.put(&ctx).await.unwrap();
        assert_eq!(stored.version, 1);

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = MemoryContextStore::new();
        let ctx = new_context("s1", Utc::now());
        let first = store.put(&ctx).await.unwrap();

        // A second writer still holding the version-0 copy loses
        let err = store.put(&ctx).await.unwrap_err();
        match err {
            FlowError::VersionConflict { expected, found, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        let second = store.put(&first).await.unwrap();
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn test_extend_ttl_only_moves_forward() {
        let store = MemoryContextStore::new();
        let now = Utc::now();
        let stored = store.put(&new_context("s1", now)).await.unwrap();

        assert!(store.extend_ttl("s1", now + Duration::minutes(10)).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap().unwrap().expires_at, stored.expires_at);

        let later = now + Duration::minutes(500);
        assert!(store.extend_ttl("s1", later).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap().unwrap().expires_at, later);

        assert!(!store.extend_ttl("nope", later).await.unwrap());
    }

    #[test]
    fn test_usable_from_blocking_code() {
        let store = MemoryContextStore::new();
        tokio_test::block_on(async {
            store.put(&new_context("s1", Utc::now())).await.unwrap();
            assert!(!store.is_empty().await);
        });
    }

    #[tokio::test]
    async fn test_delete_and_cleanup() {
        let store = MemoryContextStore::new();
        let now = Utc::now();
        store.put(&new_context("old", now - Duration::minutes(200))).await.unwrap();
        store.put(&new_context("fresh", now)).await.unwrap();
        store.put(&new_context("gone", now)).await.unwrap();

        assert!(store.delete("gone").await.unwrap());
        assert!(!store.delete("gone").await.unwrap());

        assert_eq!(store.cleanup_expired(now).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }
}
