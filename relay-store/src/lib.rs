//! Relay Storage Layer
//!
//! Durable record of which inbound message identifiers were already acted on.
//!
//! # Architecture
//!
//! - **Repository trait**: [`DedupStore`] defines the storage interface (port)
//! - **In-memory store**: fast implementation for testing
//! - **File store**: append-only, one identifier per line, rehydrated on startup
//!
//! # Usage
//!
//! ```rust
//! use relay_domain::MessageId;
//! use relay_store::{DedupStore, MemoryDedupStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryDedupStore::new();
//!     let id = MessageId::new("tg:-100:42").unwrap();
//!
//!     assert!(!store.has_seen(&id).await.unwrap());
//!     store.mark_seen(&id).await.unwrap();
//!     assert!(store.has_seen(&id).await.unwrap());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod file;
mod memory;
mod repository;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use file::{FileDedupStore, RehydrateReport};
pub use memory::MemoryDedupStore;
pub use repository::DedupStore;
