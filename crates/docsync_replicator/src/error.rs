//! Error types for the replicator.

use crate::activity::ActivityLevel;
use docsync_store::{DocumentId, StoreError};
use thiserror::Error;

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Errors that can occur while configuring or running a replicator.
///
/// Errors are cloneable because the same error is attached to status and
/// document events fanned out to several listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicatorError {
    /// The operation has no meaning for this configuration.
    #[error("unsupported operation {operation}: {reason}")]
    UnsupportedOperation {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Why it is unsupported.
        reason: String,
    },

    /// The peer could not be reached. Recovered by reconnecting.
    #[error("peer unreachable: {message}")]
    TransientConnectivity {
        /// Error message.
        message: String,
    },

    /// A single document could not be transferred.
    #[error("transfer of document {id} failed: {message}")]
    DocumentTransfer {
        /// Document that failed.
        id: DocumentId,
        /// Error message.
        message: String,
    },

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Illegal activity-level transition. Always a bug in the session driver.
    #[error("invalid activity transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current level.
        from: ActivityLevel,
        /// Attempted level.
        to: ActivityLevel,
    },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A listener or session thread could not be started.
    #[error("failed to start thread: {0}")]
    ThreadSpawn(String),

    /// The session worker panicked. The session was stopped.
    #[error("replication worker panicked: {0}")]
    WorkerPanicked(String),
}

impl ReplicatorError {
    /// Creates an unsupported operation error.
    pub fn unsupported(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a transient connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::TransientConnectivity {
            message: message.into(),
        }
    }

    /// Creates a document transfer error.
    pub fn document_transfer(id: &DocumentId, message: impl Into<String>) -> Self {
        Self::DocumentTransfer {
            id: id.clone(),
            message: message.into(),
        }
    }

    /// Returns true if the session recovers from this error by reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReplicatorError::TransientConnectivity { .. })
    }

    /// Returns true if this is the pull-only pending query rejection.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ReplicatorError::UnsupportedOperation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ReplicatorError::connectivity("connection reset").is_retryable());
        assert!(!ReplicatorError::unsupported("pending_document_ids", "pull only").is_retryable());
        assert!(
            !ReplicatorError::document_transfer(&DocumentId::new("a"), "rejected").is_retryable()
        );
        assert!(!ReplicatorError::from(StoreError::closed("local")).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ReplicatorError::InvalidStateTransition {
            from: ActivityLevel::Stopped,
            to: ActivityLevel::Busy,
        };
        assert_eq!(
            err.to_string(),
            "invalid activity transition from STOPPED to BUSY"
        );

        let err = ReplicatorError::document_transfer(&DocumentId::new("doc-1"), "rejected");
        assert!(err.to_string().contains("doc-1"));
    }
}
