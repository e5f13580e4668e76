//! Transport abstraction for talking to a replication peer.

use crate::error::{ReplicatorError, ReplicatorResult};
use docsync_store::{Document, DocumentId, DocumentStore, MemoryStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A batch of revisions pulled from a peer.
#[derive(Debug, Clone, Default)]
pub struct PullBatch {
    /// Revisions and tombstones, oldest first.
    pub documents: Vec<Document>,
    /// Cursor to pass to the next pull.
    pub checkpoint: u64,
    /// True if the peer has more revisions after this batch.
    pub has_more: bool,
}

/// A transport moves documents between the local store and one peer.
///
/// Connectivity failures must be reported as `TransientConnectivity`; the
/// session answers them by going OFFLINE and reconnecting. Any other error
/// from `push` is a per-document failure.
pub trait PeerTransport: Send + Sync {
    /// Returns the peer name, used in logs.
    fn name(&self) -> &str;

    /// Establishes the connection.
    fn connect(&self) -> ReplicatorResult<()>;

    /// Sends one revision or tombstone to the peer.
    ///
    /// Returns false if the peer already had it.
    fn push(&self, document: &Document) -> ReplicatorResult<bool>;

    /// Fetches revisions written on the peer after `checkpoint`.
    fn pull(&self, checkpoint: u64, limit: usize) -> ReplicatorResult<PullBatch>;

    /// Closes the connection.
    fn disconnect(&self);
}

/// Transport to another store in the same process.
pub struct LocalPeer {
    store: Arc<dyn DocumentStore>,
    name: String,
    connected: AtomicBool,
}

impl LocalPeer {
    /// Creates a transport to `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let name = format!("db:{}", store.name());
        Self {
            store,
            name,
            connected: AtomicBool::new(false),
        }
    }

    /// Returns true between `connect` and `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> ReplicatorResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ReplicatorError::connectivity(format!(
                "{} is not connected",
                self.name
            )))
        }
    }
}

// A closed peer store looks like a lost connection from the session's side.
fn peer_error(id: Option<&DocumentId>, err: StoreError) -> ReplicatorError {
    match (err, id) {
        (StoreError::Closed { name }, _) => {
            ReplicatorError::connectivity(format!("peer store {name} is closed"))
        }
        (err, Some(id)) => ReplicatorError::document_transfer(id, err.to_string()),
        (err, None) => ReplicatorError::Store(err),
    }
}

impl PeerTransport for LocalPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> ReplicatorResult<()> {
        // A closed store refuses every read.
        self.store
            .exists(&DocumentId::new("_connect"))
            .map_err(|e| peer_error(None, e))?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn push(&self, document: &Document) -> ReplicatorResult<bool> {
        self.check_connected()?;
        let result = if document.is_deleted() {
            self.store.apply_replicated_deletion(document.id())
        } else {
            self.store.apply_replicated(document.clone())
        };
        result.map_err(|e| peer_error(Some(document.id()), e))
    }

    fn pull(&self, checkpoint: u64, limit: usize) -> ReplicatorResult<PullBatch> {
        self.check_connected()?;
        let mut changes = self
            .store
            .iter_changes(checkpoint)
            .map_err(|e| peer_error(None, e))?
            .peekable();
        let documents: Vec<Document> = changes.by_ref().take(limit).collect();
        let has_more = changes.peek().is_some();
        let checkpoint = documents.last().map_or(checkpoint, Document::sequence);
        Ok(PullBatch {
            documents,
            checkpoint,
            has_more,
        })
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// A scriptable transport for tests.
///
/// Backed by an in-memory "remote" store. Connectivity loss, connect
/// failures, per-document rejections and push latency can be injected.
pub struct MockTransport {
    remote: Arc<MemoryStore>,
    offline: AtomicBool,
    connect_failures: AtomicU32,
    connects: AtomicU32,
    rejected: Mutex<BTreeMap<DocumentId, String>>,
    pushed: Mutex<Vec<Document>>,
    push_delay: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a reachable mock with an empty remote store.
    pub fn new() -> Self {
        Self::with_remote(Arc::new(MemoryStore::new("mock-remote")))
    }

    /// Creates a reachable mock over an existing remote store.
    pub fn with_remote(remote: Arc<MemoryStore>) -> Self {
        Self {
            remote,
            offline: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            connects: AtomicU32::new(0),
            rejected: Mutex::new(BTreeMap::new()),
            pushed: Mutex::new(Vec::new()),
            push_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<MemoryStore> {
        &self.remote
    }

    /// Makes every call fail with a connectivity error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` connects fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Makes pushes of `id` fail with a document error.
    pub fn reject_document(&self, id: impl Into<DocumentId>, message: impl Into<String>) {
        self.rejected.lock().insert(id.into(), message.into());
    }

    /// Stops rejecting `id`.
    pub fn accept_document(&self, id: &DocumentId) {
        self.rejected.lock().remove(id);
    }

    /// Sleeps this long inside every push.
    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock() = delay;
    }

    /// Returns every revision accepted by push, in order.
    pub fn pushed(&self) -> Vec<Document> {
        self.pushed.lock().clone()
    }

    /// Returns the number of connect attempts.
    pub fn connect_attempts(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> ReplicatorResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ReplicatorError::connectivity("mock peer offline"))
        } else {
            Ok(())
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&self) -> ReplicatorResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ReplicatorError::connectivity("mock connect refused"));
        }
        Ok(())
    }

    fn push(&self, document: &Document) -> ReplicatorResult<bool> {
        let delay = *self.push_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.check_online()?;
        if let Some(message) = self.rejected.lock().get(document.id()) {
            return Err(ReplicatorError::document_transfer(document.id(), message.clone()));
        }
        let changed = if document.is_deleted() {
            self.remote.apply_replicated_deletion(document.id())?
        } else {
            self.remote.apply_replicated(document.clone())?
        };
        self.pushed.lock().push(document.clone());
        Ok(changed)
    }

    fn pull(&self, checkpoint: u64, limit: usize) -> ReplicatorResult<PullBatch> {
        self.check_online()?;
        let mut changes = self.remote.iter_changes(checkpoint)?.peekable();
        let documents: Vec<Document> = changes.by_ref().take(limit).collect();
        let has_more = changes.peek().is_some();
        let checkpoint = documents.last().map_or(checkpoint, Document::sequence);
        Ok(PullBatch {
            documents,
            checkpoint,
            has_more,
        })
    }

    fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_with(count: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new("peer"));
        for i in 0..count {
            store
                .save(Document::new(format!("doc-{i}")).with_string("k", "v"))
                .unwrap();
        }
        store
    }

    #[test]
    fn local_peer_requires_connect() {
        let peer = LocalPeer::new(peer_with(0));
        let err = peer.push(&Document::new("a")).unwrap_err();
        assert!(err.is_retryable());

        peer.connect().unwrap();
        assert!(peer.is_connected());
        assert!(peer.push(&Document::new("a").with_revision(1)).unwrap());
        assert!(!peer.push(&Document::new("a").with_revision(1)).unwrap());

        peer.disconnect();
        assert!(!peer.is_connected());
    }

    #[test]
    fn local_peer_pulls_in_batches() {
        let peer = LocalPeer::new(peer_with(5));
        peer.connect().unwrap();

        let first = peer.pull(0, 2).unwrap();
        assert_eq!(first.documents.len(), 2);
        assert!(first.has_more);
        assert_eq!(first.checkpoint, 2);

        let rest = peer.pull(first.checkpoint, 10).unwrap();
        assert_eq!(rest.documents.len(), 3);
        assert!(!rest.has_more);
        assert_eq!(rest.checkpoint, 5);

        let empty = peer.pull(rest.checkpoint, 10).unwrap();
        assert!(empty.documents.is_empty());
        assert_eq!(empty.checkpoint, 5);
    }

    #[test]
    fn closed_peer_is_a_connectivity_failure() {
        let store = peer_with(1);
        let peer = LocalPeer::new(store.clone());
        store.close();
        assert!(peer.connect().unwrap_err().is_retryable());
    }

    #[test]
    fn local_peer_pushes_tombstones() {
        let store = peer_with(1);
        let peer = LocalPeer::new(store.clone());
        peer.connect().unwrap();

        assert!(peer.push(&Document::tombstone("doc-0", 2)).unwrap());
        assert!(!store.exists(&DocumentId::new("doc-0")).unwrap());
        assert!(!peer.push(&Document::tombstone("doc-0", 2)).unwrap());
    }

    #[test]
    fn mock_connect_failures_and_offline() {
        let mock = MockTransport::new();
        mock.fail_next_connects(2);
        assert!(mock.connect().is_err());
        assert!(mock.connect().is_err());
        assert!(mock.connect().is_ok());
        assert_eq!(mock.connect_attempts(), 3);

        mock.set_offline(true);
        assert!(mock.connect().unwrap_err().is_retryable());
        assert!(mock.pull(0, 10).unwrap_err().is_retryable());
    }

    #[test]
    fn mock_rejects_documents() {
        let mock = MockTransport::new();
        mock.reject_document("bad", "validation failed");

        let err = mock.push(&Document::new("bad")).unwrap_err();
        assert!(!err.is_retryable());
        assert!(mock.push(&Document::new("good").with_revision(1)).unwrap());
        assert_eq!(mock.pushed().len(), 1);

        mock.accept_document(&DocumentId::new("bad"));
        assert!(mock.push(&Document::new("bad").with_revision(1)).unwrap());
    }
}
