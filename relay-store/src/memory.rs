//! In-memory dedup store
//!
//! Used for testing and development without a dedup file.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::DedupStore;
use async_trait::async_trait;
use relay_domain::MessageId;
use std::collections::HashSet;
use std::sync::RwLock;

/// In-memory dedup store for testing
#[derive(Default)]
pub struct MemoryDedupStore {
    seen: RwLock<HashSet<MessageId>>,
}

impl MemoryDedupStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with identifiers
    pub fn with_ids(ids: impl IntoIterator<Item = MessageId>) -> Self {
        Self {
            seen: RwLock::new(ids.into_iter().collect()),
        }
    }
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn has_seen(&self, id: &MessageId) -> Result<bool, StoreError> {
        Ok(self.seen.read().map_err(poisoned)?.contains(id))
    }

    async fn mark_seen(&self, id: &MessageId) -> Result<(), StoreError> {
        self.seen.write().map_err(poisoned)?.insert(id.clone());
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.seen.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> MessageId {
        MessageId::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_mark_and_check() {
        let store = MemoryDedupStore::new();
        assert!(store.is_empty().await.unwrap());

        store.mark_seen(&id("1")).await.unwrap();
        store.mark_seen(&id("1")).await.unwrap();

        assert!(store.has_seen(&id("1")).await.unwrap());
        assert!(!store.has_seen(&id("2")).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_with_ids() {
        let store = MemoryDedupStore::with_ids([id("a"), id("b")]);
        assert!(store.has_seen(&id("b")).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 2);
    }
}
