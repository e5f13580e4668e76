//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up replication scenarios.

use docsync_replicator::{Endpoint, Replicator, ReplicatorConfig, ReplicatorType, RetryConfig};
use docsync_store::{Document, DocumentId, DocumentStore, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound for waits in tests that expect an event to arrive.
pub const LONG_WAIT: Duration = Duration::from_secs(10);

/// Wait used to check that nothing else arrives.
pub const SHORT_WAIT: Duration = Duration::from_millis(100);

/// A local store and a peer store.
pub struct StorePair {
    /// The store replicated from.
    pub local: Arc<MemoryStore>,
    /// The other side.
    pub peer: Arc<MemoryStore>,
}

impl StorePair {
    /// Creates two empty stores named `local` and `peer`.
    pub fn new() -> Self {
        Self {
            local: Arc::new(MemoryStore::new("local")),
            peer: Arc::new(MemoryStore::new("peer")),
        }
    }

    /// Returns a one-shot configuration replicating with the peer store.
    ///
    /// Retries are fast so failing tests finish quickly.
    pub fn config(&self, replicator_type: ReplicatorType) -> ReplicatorConfig {
        ReplicatorConfig::new(
            self.local.clone(),
            Endpoint::Database(self.peer.clone()),
        )
        .with_type(replicator_type)
        .with_retry(fast_retry(3))
        .with_poll_interval(Duration::from_millis(10))
    }

    /// Creates a one-shot replicator with the peer store.
    pub fn replicator(&self, replicator_type: ReplicatorType) -> Replicator {
        Replicator::new(self.config(replicator_type)).expect("Invalid replicator config")
    }
}

impl Default for StorePair {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry configuration with millisecond delays and no jitter.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(20))
        .with_jitter(0.0)
}

/// Saves `count` documents `doc-0..doc-{count}` with `key = value`.
pub fn create_documents(
    store: &dyn DocumentStore,
    count: usize,
    key: &str,
    value: &str,
) -> Vec<DocumentId> {
    (0..count)
        .map(|i| {
            store
                .save(Document::new(format!("doc-{i}")).with_string(key, value))
                .expect("Failed to save document")
                .id()
                .clone()
        })
        .collect()
}

/// Overwrites `key` on each document.
pub fn update_documents(store: &dyn DocumentStore, ids: &[DocumentId], key: &str, value: &str) {
    for id in ids {
        let mut doc = store
            .get(id)
            .expect("Failed to get document")
            .expect("Document to update does not exist");
        doc.set_string(key, value);
        store.save(doc).expect("Failed to update document");
    }
}

/// Deletes each document.
pub fn delete_documents(store: &dyn DocumentStore, ids: &[DocumentId]) {
    for id in ids {
        store.delete(id).expect("Failed to delete document");
    }
}

/// Returns the string value of `key` on a live document.
pub fn string_value(store: &dyn DocumentStore, id: &DocumentId, key: &str) -> Option<String> {
    store
        .get(id)
        .expect("Failed to get document")
        .and_then(|doc| doc.string(key).map(str::to_string))
}

/// A JSON store file in a temporary directory.
pub struct TestStoreFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestStoreFile {
    /// Creates a path to a file that does not exist yet.
    pub fn missing(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join(name),
            _temp_dir: temp_dir,
        }
    }

    /// Writes `documents` as a JSON array.
    pub fn with_documents(name: &str, documents: &[Document]) -> Self {
        let file = Self::missing(name);
        let json = serde_json::to_string_pretty(documents).expect("Failed to encode documents");
        std::fs::write(&file.path, json).expect("Failed to write store file");
        file
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the documents currently in the file.
    pub fn read(&self) -> Vec<Document> {
        let json = std::fs::read_to_string(&self.path).expect("Failed to read store file");
        serde_json::from_str(&json).expect("Failed to decode store file")
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store pair whose local side holds `count` documents.
    pub fn populated_pair(count: usize) -> (StorePair, Vec<DocumentId>) {
        let pair = StorePair::new();
        let ids = create_documents(pair.local.as_ref(), count, "test-key", "create");
        (pair, ids)
    }

    /// Creates a store pair with distinct documents on each side.
    pub fn diverged_pair(local_count: usize, peer_count: usize) -> StorePair {
        let pair = StorePair::new();
        for i in 0..local_count {
            pair.local
                .save(Document::new(format!("local-{i}")).with_string("origin", "local"))
                .expect("Failed to save document");
        }
        for i in 0..peer_count {
            pair.peer
                .save(Document::new(format!("peer-{i}")).with_string("origin", "peer"))
                .expect("Failed to save document");
        }
        pair
    }
}
