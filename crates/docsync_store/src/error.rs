//! Error types for the document store.

use crate::document::DocumentId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in document store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Document not found.
    #[error("document not found: {id}")]
    NotFound {
        /// The identifier that was looked up.
        id: DocumentId,
    },

    /// Document is malformed and cannot be stored.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// Store has been closed.
    #[error("store is closed: {name}")]
    Closed {
        /// Name of the closed store.
        name: String,
    },
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(id: &DocumentId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a closed store error.
    pub fn closed(name: impl Into<String>) -> Self {
        Self::Closed { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::not_found(&DocumentId::new("doc-1"));
        assert_eq!(err.to_string(), "document not found: doc-1");

        let err = StoreError::closed("local");
        assert_eq!(err.to_string(), "store is closed: local");
    }
}
