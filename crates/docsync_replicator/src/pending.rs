//! Pending-document tracking.
//!
//! A document is pending while it exists locally, is in scope, and no
//! transfer of its latest revision has been confirmed. Membership is
//! structural: the initial set is recomputed from the store every session,
//! so no replication log has to survive restarts.

use crate::error::ReplicatorResult;
use crate::scope::ReplicationScope;
use docsync_store::{DocumentId, DocumentStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Owns the pending set of one push session.
///
/// Each entry remembers the store sequence of the revision that made it
/// pending, so a confirmation for an older revision cannot clear a newer
/// one. Readers only ever get copies.
pub struct PendingDocumentTracker {
    scope: Arc<ReplicationScope>,
    store: Arc<dyn DocumentStore>,
    pending: RwLock<BTreeMap<DocumentId, u64>>,
}

impl PendingDocumentTracker {
    /// Enumerates the local documents that are pending at session start.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for pull-only scopes, or a store error.
    pub fn compute_initial_pending_set(
        scope: &ReplicationScope,
        store: &dyn DocumentStore,
    ) -> ReplicatorResult<BTreeSet<DocumentId>> {
        scope.require_push("pending_document_ids")?;
        Ok(scope
            .candidates(store)?
            .map(|doc| doc.id().clone())
            .collect())
    }

    /// Creates a tracker seeded from the current store contents.
    pub fn new(
        scope: Arc<ReplicationScope>,
        store: Arc<dyn DocumentStore>,
    ) -> ReplicatorResult<Self> {
        scope.require_push("pending_document_ids")?;
        let pending: BTreeMap<DocumentId, u64> = scope
            .candidates(store.as_ref())?
            .map(|doc| (doc.id().clone(), doc.sequence()))
            .collect();
        debug!(
            endpoint = scope.endpoint(),
            pending = pending.len(),
            "seeded pending set"
        );
        Ok(Self {
            scope,
            store,
            pending: RwLock::new(pending),
        })
    }

    /// Re-evaluates a document after a local write.
    ///
    /// Returns true if the document became pending. A document that no
    /// longer matches the scope is dropped from the set.
    pub fn on_document_created_or_updated(&self, id: &DocumentId) -> ReplicatorResult<bool> {
        let document = self.store.get(id)?;
        let mut pending = self.pending.write();
        match document {
            Some(doc) if self.scope.matches(&doc) => {
                let newly = pending.insert(id.clone(), doc.sequence()).is_none();
                Ok(newly)
            }
            _ => {
                pending.remove(id);
                Ok(false)
            }
        }
    }

    /// Drops a deleted document.
    pub fn on_document_deleted(&self, id: &DocumentId) -> bool {
        self.pending.write().remove(id).is_some()
    }

    /// Drops a document after a confirmed transfer. Idempotent.
    pub fn on_transfer_confirmed(&self, id: &DocumentId) -> bool {
        self.pending.write().remove(id).is_some()
    }

    /// Drops a document after its revision at `sequence` was confirmed.
    ///
    /// Keeps the entry if a newer revision became pending meanwhile.
    pub fn on_revision_confirmed(&self, id: &DocumentId, sequence: u64) -> bool {
        let mut pending = self.pending.write();
        match pending.get(id) {
            Some(&pending_seq) if pending_seq <= sequence => {
                pending.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Returns a copy of the pending identifiers.
    pub fn snapshot(&self) -> BTreeSet<DocumentId> {
        self.pending.read().keys().cloned().collect()
    }

    /// Returns true if the document is pending.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.pending.read().contains_key(id)
    }

    /// Returns the number of pending documents.
    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }

    /// Returns the scope this tracker evaluates against.
    pub fn scope(&self) -> &ReplicationScope {
        &self.scope
    }
}
