//! CLI error type.

use docsync_replicator::ReplicatorError;
use docsync_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a store file failed.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A store file is not a JSON array of documents.
    #[error("{path}: invalid store file: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Replication error.
    #[error(transparent)]
    Replication(#[from] ReplicatorError),

    /// Bad command-line argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session did not stop in time.
    #[error("replication did not finish within {0} seconds")]
    Timeout(u64),
}
