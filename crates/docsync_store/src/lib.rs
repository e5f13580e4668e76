//! # docsync Store
//!
//! Document model and storage collaborator for docsync.
//!
//! This crate provides:
//! - `Document` and `DocumentId`, the unit of replication
//! - The `DocumentStore` trait consumed by the replicator
//! - `MemoryStore`, an in-memory store with tombstones and sequence numbers
//! - A change feed that reports every committed write in commit order
//!
//! The store is deliberately narrow: it knows how to save, fetch, delete and
//! enumerate documents. Replication policy lives in `docsync_replicator`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod document;
mod error;
mod memory;
mod store;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeOrigin, ChangeType};
pub use document::{Document, DocumentId};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{DocumentIter, DocumentStore};
