//! Repository trait definitions (Ports)
//!
//! Implementations can be file-backed, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use relay_domain::MessageId;

/// Set of message identifiers that were already acted on.
///
/// Append-only: an identifier, once marked, is never reported unseen again.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Has this identifier been marked already?
    async fn has_seen(&self, id: &MessageId) -> Result<bool, StoreError>;

    /// Durably record the identifier, then add it to the in-memory set.
    ///
    /// Marking an identifier twice is a no-op.
    async fn mark_seen(&self, id: &MessageId) -> Result<(), StoreError>;

    /// Number of identifiers recorded
    async fn len(&self) -> Result<usize, StoreError>;

    /// True when nothing has been recorded yet
    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
