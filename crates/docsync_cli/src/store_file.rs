//! JSON store files.
//!
//! A store file holds a JSON array of documents, tombstones included, in
//! sequence order. A missing file is an empty store.

use crate::error::{CliError, CliResult};
use docsync_store::{Document, MemoryStore};
use std::path::Path;
use tracing::debug;

/// Loads a store file.
pub fn load(path: &Path) -> CliResult<MemoryStore> {
    let name = path.display().to_string();
    if !path.exists() {
        debug!(path = %name, "store file missing; starting empty");
        return Ok(MemoryStore::new(name));
    }

    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let documents: Vec<Document> = serde_json::from_str(&json).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %name, documents = documents.len(), "loaded store file");
    Ok(MemoryStore::restore(name, documents)?)
}

/// Writes a store back to its file.
pub fn save(path: &Path, store: &MemoryStore) -> CliResult<()> {
    let documents = store.snapshot()?;
    let json = serde_json::to_string_pretty(&documents).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), documents = documents.len(), "saved store file");
    Ok(())
}
