//! In-memory document store.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeOrigin, ChangeType};
use crate::document::{Document, DocumentId};
use crate::error::{StoreError, StoreResult};
use crate::store::{DocumentIter, DocumentStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use tracing::debug;

/// An in-memory document store.
///
/// Suitable for tests, for the CLI and as the peer of a local-to-local
/// replication. Deleted documents are kept as tombstones so that peers
/// pulling from this store see the deletion.
///
/// # Thread Safety
///
/// The store is thread-safe and is usually shared behind an `Arc`.
/// Change events are emitted while the write lock is held, so subscribers
/// observe writes in sequence order.
///
/// # Example
///
/// ```rust
/// use docsync_store::{Document, DocumentId, DocumentStore, MemoryStore};
///
/// let store = MemoryStore::new("local");
/// let saved = store.save(Document::new("doc-1").with_string("k", "v")).unwrap();
/// assert_eq!(saved.sequence(), 1);
/// assert!(store.exists(&DocumentId::new("doc-1")).unwrap());
/// ```
pub struct MemoryStore {
    name: String,
    state: RwLock<StoreState>,
    feed: ChangeFeed,
    closed: AtomicBool,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<DocumentId, Document>,
    last_sequence: u64,
}

impl StoreState {
    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    fn is_live(&self, id: &DocumentId) -> bool {
        self.documents.get(id).is_some_and(|doc| !doc.is_deleted())
    }
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(StoreState::default()),
            feed: ChangeFeed::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a store pre-populated with local writes.
    pub fn with_documents(
        name: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> StoreResult<Self> {
        let store = Self::new(name);
        for doc in documents {
            store.save(doc)?;
        }
        Ok(store)
    }

    /// Closes the store. Every later operation fails with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns true while the store is open.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Rebuilds a store from a snapshot taken with [`MemoryStore::snapshot`].
    ///
    /// Revisions and tombstones are kept as given. Sequence numbers are
    /// reassigned in input order and no change events are emitted.
    pub fn restore(
        name: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> StoreResult<Self> {
        let store = Self::new(name);
        {
            let mut state = store.state.write();
            for mut doc in documents {
                if doc.id().is_empty() {
                    return Err(StoreError::invalid_document("document id must not be empty"));
                }
                let sequence = state.next_sequence();
                doc.stamp(doc.revision(), sequence);
                state.documents.insert(doc.id().clone(), doc);
            }
        }
        debug!(
            store = %store.name,
            documents = store.state.read().documents.len(),
            "restored snapshot"
        );
        Ok(store)
    }

    /// Returns every document and tombstone in sequence order.
    pub fn snapshot(&self) -> StoreResult<Vec<Document>> {
        Ok(self.iter_changes(0)?.collect())
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::closed(&self.name))
        }
    }

    fn write_document(
        &self,
        mut document: Document,
        origin: ChangeOrigin,
    ) -> StoreResult<Option<Document>> {
        self.check_open()?;
        if document.id().is_empty() {
            return Err(StoreError::invalid_document("document id must not be empty"));
        }

        let mut state = self.state.write();
        if document.is_deleted() && !state.is_live(document.id()) {
            return Ok(None);
        }
        let existing = state.documents.get(document.id());

        let revision = match (origin, existing) {
            (ChangeOrigin::Replicated, Some(current)) if current.same_revision(&document) => {
                return Ok(None);
            }
            (ChangeOrigin::Replicated, _) => document.revision(),
            (ChangeOrigin::Local, Some(current)) => current.revision() + 1,
            (ChangeOrigin::Local, None) => 1,
        };
        let change_type = if document.is_deleted() {
            ChangeType::Delete
        } else if state.is_live(document.id()) {
            ChangeType::Update
        } else {
            ChangeType::Insert
        };

        let sequence = state.next_sequence();
        document.stamp(revision, sequence);
        state
            .documents
            .insert(document.id().clone(), document.clone());

        debug!(
            store = %self.name,
            id = %document.id(),
            sequence,
            revision,
            ?change_type,
            ?origin,
            "committed write"
        );
        self.feed.emit(ChangeEvent::new(
            sequence,
            document.id().clone(),
            change_type,
            origin,
        ));
        Ok(Some(document))
    }

    fn delete_document(&self, id: &DocumentId, origin: ChangeOrigin) -> StoreResult<bool> {
        self.check_open()?;
        let tombstone = {
            let state = self.state.read();
            match state.documents.get(id) {
                Some(doc) if !doc.is_deleted() => {
                    let mut tombstone = doc.clone();
                    tombstone.mark_deleted();
                    tombstone
                }
                _ => return Ok(false),
            }
        };
        // Replicated deletions are stamped locally like any other write.
        let tombstone = match origin {
            ChangeOrigin::Local => tombstone,
            ChangeOrigin::Replicated => {
                let revision = tombstone.revision() + 1;
                tombstone.with_revision(revision)
            }
        };
        Ok(self.write_document(tombstone, origin)?.is_some())
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        self.check_open()?;
        Ok(self
            .state
            .read()
            .documents
            .get(id)
            .filter(|doc| !doc.is_deleted())
            .cloned())
    }

    fn latest(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        self.check_open()?;
        Ok(self.state.read().documents.get(id).cloned())
    }

    fn save(&self, document: Document) -> StoreResult<Document> {
        if document.is_deleted() {
            return Err(StoreError::invalid_document(
                "tombstones cannot be saved; use delete",
            ));
        }
        let id = document.id().clone();
        self.write_document(document, ChangeOrigin::Local)?
            .ok_or_else(|| StoreError::not_found(&id))
    }

    fn delete(&self, id: &DocumentId) -> StoreResult<bool> {
        self.delete_document(id, ChangeOrigin::Local)
    }

    fn iter_all(&self) -> StoreResult<DocumentIter> {
        self.check_open()?;
        let live: Vec<Document> = self
            .state
            .read()
            .documents
            .values()
            .filter(|doc| !doc.is_deleted())
            .cloned()
            .collect();
        Ok(Box::new(live.into_iter()))
    }

    fn iter_changes(&self, since: u64) -> StoreResult<DocumentIter> {
        self.check_open()?;
        let mut changed: Vec<Document> = self
            .state
            .read()
            .documents
            .values()
            .filter(|doc| doc.sequence() > since)
            .cloned()
            .collect();
        changed.sort_by_key(Document::sequence);
        Ok(Box::new(changed.into_iter()))
    }

    fn apply_replicated(&self, document: Document) -> StoreResult<bool> {
        if document.is_deleted() {
            return self.apply_replicated_deletion(document.id());
        }
        Ok(self
            .write_document(document, ChangeOrigin::Replicated)?
            .is_some())
    }

    fn apply_replicated_deletion(&self, id: &DocumentId) -> StoreResult<bool> {
        self.delete_document(id, ChangeOrigin::Replicated)
    }

    fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    fn last_sequence(&self) -> u64 {
        self.state.read().last_sequence
    }
}
