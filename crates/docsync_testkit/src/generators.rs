//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents and sequences of store
//! writes over a small identifier space, so that updates and deletions of
//! existing documents are common.

use docsync_store::{Document, DocumentId, DocumentStore};
use proptest::prelude::*;

/// Strategy for identifiers drawn from `doc-0..doc-{space}`.
pub fn document_id_strategy(space: usize) -> impl Strategy<Value = DocumentId> {
    (0..space.max(1)).prop_map(|i| DocumentId::new(format!("doc-{i}")))
}

/// Strategy for short property values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for documents with one `test-key` property.
pub fn document_strategy(space: usize) -> impl Strategy<Value = Document> {
    (document_id_strategy(space), value_strategy())
        .prop_map(|(id, value)| Document::new(id).with_string("test-key", value))
}

/// A local write.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Create or update a document
    Save {
        /// Document ID
        id: DocumentId,
        /// Value of `test-key`
        value: String,
    },
    /// Delete a document
    Delete {
        /// Document ID
        id: DocumentId,
    },
}

impl StoreOperation {
    /// Applies the write to a store.
    pub fn apply(&self, store: &dyn DocumentStore) {
        match self {
            StoreOperation::Save { id, value } => {
                store
                    .save(Document::new(id.clone()).with_string("test-key", value.clone()))
                    .expect("Failed to save document");
            }
            StoreOperation::Delete { id } => {
                store.delete(id).expect("Failed to delete document");
            }
        }
    }
}

/// Strategy for store writes.
pub fn store_operation_strategy(space: usize) -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        3 => (document_id_strategy(space), value_strategy())
            .prop_map(|(id, value)| StoreOperation::Save { id, value }),
        1 => document_id_strategy(space).prop_map(|id| StoreOperation::Delete { id }),
    ]
}

/// Strategy for a sequence of store writes.
pub fn operation_sequence_strategy(
    space: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(space), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
