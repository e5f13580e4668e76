//! Change feed for observing committed document writes.
//!
//! Every committed save or delete produces exactly one [`ChangeEvent`].
//! The replicator subscribes to the feed of its local store to keep the
//! pending set current while a session runs.
//!
//! # Usage
//!
//! ```rust
//! use docsync_store::{Document, DocumentStore, MemoryStore};
//!
//! let store = MemoryStore::new("local");
//! let changes = store.subscribe();
//!
//! store.save(Document::new("doc-1").with_string("k", "v")).unwrap();
//!
//! let event = changes.recv().unwrap();
//! assert_eq!(event.document_id.as_str(), "doc-1");
//! ```

use crate::document::DocumentId;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Document was inserted (no live version existed).
    Insert,
    /// Document was updated (a live version existed).
    Update,
    /// Document was deleted.
    Delete,
}

/// Who produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Written by a local caller.
    Local,
    /// Applied by a replicator on behalf of a peer.
    Replicated,
}

/// A single committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Sequence number of the write.
    pub sequence: u64,
    /// Document that changed.
    pub document_id: DocumentId,
    /// Type of change.
    pub change_type: ChangeType,
    /// Who produced the write.
    pub origin: ChangeOrigin,
}

impl ChangeEvent {
    /// Creates a change event.
    pub fn new(
        sequence: u64,
        document_id: DocumentId,
        change_type: ChangeType,
        origin: ChangeOrigin,
    ) -> Self {
        Self {
            sequence,
            document_id,
            change_type,
            origin,
        }
    }

    /// Returns true if the change was made by a local caller.
    pub fn is_local(&self) -> bool {
        self.origin == ChangeOrigin::Local
    }
}

/// Fans committed writes out to live subscribers.
///
/// A subscriber only sees writes committed after it subscribed; there is
/// no backlog. Senders whose receiver is gone are dropped on the next
/// emit.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    /// Creates a feed with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Returns a receiver for every change emitted from now on.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends `event` to every subscriber, in commit order.
    ///
    /// Callers emit while holding their write lock so subscribers observe
    /// sequences in increasing order.
    pub fn emit(&self, event: ChangeEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of subscribers still attached.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
