//! Document store trait definition.

use crate::change_feed::ChangeEvent;
use crate::document::{Document, DocumentId};
use crate::error::StoreResult;
use std::sync::mpsc::Receiver;

/// A finite sequence of documents produced by one enumeration call.
pub type DocumentIter = Box<dyn Iterator<Item = Document> + Send>;

/// The storage collaborator consumed by the replicator.
///
/// # Invariants
///
/// - Every committed write gets a sequence number greater than all earlier ones
/// - `get` and `iter_all` never return tombstones; `latest` does
/// - `iter_changes` returns live documents and tombstones in sequence order
/// - Each enumeration call is independent; later writes do not disturb an
///   iterator already handed out
/// - Every committed write is reported once on each subscribed change feed
///
/// # Implementors
///
/// - [`super::MemoryStore`] - In-memory store
pub trait DocumentStore: Send + Sync {
    /// Returns the store name, used in logs.
    fn name(&self) -> &str;

    /// Returns true if a live document with this identifier exists.
    fn exists(&self, id: &DocumentId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Fetches the live document with this identifier.
    fn get(&self, id: &DocumentId) -> StoreResult<Option<Document>>;

    /// Fetches the latest revision of a document, tombstone included.
    fn latest(&self, id: &DocumentId) -> StoreResult<Option<Document>>;

    /// Saves a document as a local write and returns the stored revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or the store is closed.
    fn save(&self, document: Document) -> StoreResult<Document>;

    /// Deletes a document as a local write.
    ///
    /// Returns false if there was no live document to delete.
    fn delete(&self, id: &DocumentId) -> StoreResult<bool>;

    /// Enumerates all live documents.
    fn iter_all(&self) -> StoreResult<DocumentIter>;

    /// Enumerates documents and tombstones written after `since`.
    fn iter_changes(&self, since: u64) -> StoreResult<DocumentIter>;

    /// Applies a revision received from a peer.
    ///
    /// The incoming revision number is kept. Returns false if the stored
    /// revision is already identical.
    fn apply_replicated(&self, document: Document) -> StoreResult<bool>;

    /// Applies a deletion received from a peer.
    ///
    /// Returns false if there was no live document to delete.
    fn apply_replicated_deletion(&self, id: &DocumentId) -> StoreResult<bool>;

    /// Subscribes to committed writes.
    fn subscribe(&self) -> Receiver<ChangeEvent>;

    /// Returns the sequence number of the last committed write.
    fn last_sequence(&self) -> u64;

    /// Returns the number of live documents.
    fn count(&self) -> StoreResult<usize> {
        Ok(self.iter_all()?.count())
    }
}
