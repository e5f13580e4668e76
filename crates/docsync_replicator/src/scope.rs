//! Which local documents a session considers.

use crate::config::{DocumentFilter, ReplicatorConfig, ReplicatorType};
use crate::error::{ReplicatorError, ReplicatorResult};
use docsync_store::{Document, DocumentId, DocumentStore};
use std::collections::BTreeSet;
use std::fmt;

/// Direction, filter and endpoint of one session. Immutable once built.
#[derive(Clone)]
pub struct ReplicationScope {
    replicator_type: ReplicatorType,
    filter: Option<DocumentFilter>,
    document_ids: Option<BTreeSet<DocumentId>>,
    endpoint: String,
}

impl ReplicationScope {
    /// Builds the scope described by a configuration.
    pub fn from_config(config: &ReplicatorConfig) -> Self {
        Self {
            replicator_type: config.replicator_type,
            filter: config.filter.clone(),
            document_ids: config.document_ids.clone(),
            endpoint: config.endpoint.name(),
        }
    }

    /// Builds a scope without a filter or id allow-list.
    pub fn unfiltered(replicator_type: ReplicatorType, endpoint: impl Into<String>) -> Self {
        Self {
            replicator_type,
            filter: None,
            document_ids: None,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the direction.
    pub fn replicator_type(&self) -> ReplicatorType {
        self.replicator_type
    }

    /// Returns the endpoint name.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fails with `UnsupportedOperation` unless the direction includes push.
    pub fn require_push(&self, operation: &'static str) -> ReplicatorResult<()> {
        if self.replicator_type.includes_push() {
            Ok(())
        } else {
            Err(ReplicatorError::unsupported(
                operation,
                "pending documents are only tracked when pushing; this replicator is pull-only",
            ))
        }
    }

    /// Returns true if the identifier passes the allow-list.
    pub fn admits_id(&self, id: &DocumentId) -> bool {
        self.document_ids
            .as_ref()
            .map_or(true, |allowed| allowed.contains(id))
    }

    /// Returns true if a live document is in scope.
    ///
    /// Tombstones never match; only the allow-list applies to them.
    pub fn matches(&self, document: &Document) -> bool {
        !document.is_deleted()
            && self.admits_id(document.id())
            && self.filter.as_ref().map_or(true, |filter| filter(document))
    }

    /// Enumerates the in-scope live documents of a store.
    pub fn candidates<'a>(
        &'a self,
        store: &dyn DocumentStore,
    ) -> ReplicatorResult<impl Iterator<Item = Document> + 'a> {
        Ok(store.iter_all()?.filter(move |doc| self.matches(doc)))
    }
}

impl fmt::Debug for ReplicationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationScope")
            .field("replicator_type", &self.replicator_type)
            .field("filter", &self.filter.is_some())
            .field("document_ids", &self.document_ids)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use docsync_store::MemoryStore;
    use std::sync::Arc;

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new("local");
        for (id, kind) in [("a", "keep"), ("b", "skip"), ("c", "keep")] {
            store
                .save(Document::new(id).with_string("kind", kind))
                .unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn filter_and_allow_list() {
        let local = store();
        let config = ReplicatorConfig::new(
            local.clone(),
            Endpoint::Database(Arc::new(MemoryStore::new("peer"))),
        )
        .with_filter(|doc| doc.string("kind") == Some("keep"))
        .with_document_ids(["a", "b"]);
        let scope = ReplicationScope::from_config(&config);

        let ids: Vec<_> = scope
            .candidates(local.as_ref())
            .unwrap()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(scope.endpoint(), "db:peer");
    }

    #[test]
    fn tombstones_never_match() {
        let scope = ReplicationScope::unfiltered(ReplicatorType::Push, "peer");
        assert!(!scope.matches(&Document::tombstone("a", 2)));
        assert!(scope.admits_id(&DocumentId::new("a")));
    }

    #[test]
    fn pull_only_has_no_pending_notion() {
        let scope = ReplicationScope::unfiltered(ReplicatorType::Pull, "peer");
        let err = scope.require_push("pending_document_ids").unwrap_err();
        assert!(err.is_unsupported());

        assert!(ReplicationScope::unfiltered(ReplicatorType::PushAndPull, "peer")
            .require_push("pending_document_ids")
            .is_ok());
    }
}
