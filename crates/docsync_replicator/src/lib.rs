//! # docsync Replicator
//!
//! Replication sessions between a local document store and one peer.
//!
//! This crate provides:
//! - `Replicator`, which runs push, pull or push-and-pull sessions
//! - Pending-document tracking for push sessions
//! - An activity-level state machine (CONNECTING, BUSY, IDLE, OFFLINE, STOPPED)
//! - Change and document listeners with ordered, non-overlapping delivery
//! - Reconnect with exponential backoff
//! - A transport abstraction with an in-process peer and a scriptable mock
//!
//! ## Architecture
//!
//! Every `start` builds a session that runs on its own thread. The session
//! pulls first, then pushes the pending documents and local deletions.
//! The pending set is recomputed from the store at session start and kept
//! current through the store's change feed.
//!
//! ## Key Invariants
//!
//! - A pending document exists locally, is in scope, and has no confirmed
//!   transfer of its latest revision
//! - Pending queries return copies, never live views
//! - Pull-only replicators reject pending queries at every activity level
//! - Each transition emits one status event; nothing follows STOPPED
//! - Callbacks of one listener never overlap

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod activity;
mod config;
mod dispatch;
mod error;
mod event;
mod pending;
mod replicator;
mod scope;
mod session;
mod transport;

pub use activity::{ActivityLevel, ActivityStateMachine};
pub use config::{
    DocumentFilter, Endpoint, ReplicatorConfig, ReplicatorType, RetryConfig, MAX_RETRY_DELAY,
};
pub use dispatch::{EventDispatcher, ListenerToken};
pub use error::{ReplicatorError, ReplicatorResult};
pub use event::{
    DocumentTransferEvent, Progress, ReplicatorStatus, StatusEvent, TransferDirection,
};
pub use pending::PendingDocumentTracker;
pub use replicator::{DocumentReplication, Replicator, ReplicatorChange};
pub use scope::ReplicationScope;
pub use transport::{LocalPeer, MockTransport, PeerTransport, PullBatch};
