//! Pending command implementation.

use super::ScopeArgs;
use crate::error::CliResult;
use crate::store_file;
use docsync_replicator::{Endpoint, Replicator, ReplicatorConfig, ReplicatorType};
use docsync_store::MemoryStore;
use std::path::Path;
use std::sync::Arc;

/// Lists the documents of a store file that a push would transfer.
pub fn run(local_path: &Path, scope: &ScopeArgs) -> CliResult<Vec<String>> {
    let local = Arc::new(store_file::load(local_path)?);
    // The peer is never contacted; it only completes the configuration.
    let peer = Arc::new(MemoryStore::new("unused"));

    let config = scope.apply(
        ReplicatorConfig::new(local, Endpoint::Database(peer)).with_type(ReplicatorType::Push),
    )?;
    let pending = Replicator::new(config)?.pending_document_ids()?;
    Ok(pending.into_iter().map(|id| id.to_string()).collect())
}

/// Prints pending identifiers as text or JSON.
pub fn print(pending: &[String], format: &str) -> CliResult<()> {
    match format {
        "json" => println!("{}", serde_json::Value::from(pending.to_vec())),
        _ => {
            println!("Pending: {}", pending.len());
            for id in pending {
                println!("  {id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_store::Document;
    use docsync_testkit::TestStoreFile;

    #[test]
    fn lists_in_scope_documents() {
        let file = TestStoreFile::with_documents(
            "local.json",
            &[
                Document::new("a").with_string("kind", "note"),
                Document::new("b").with_string("kind", "todo"),
                Document::tombstone("c", 2),
            ],
        );

        let all = run(file.path(), &ScopeArgs::default()).unwrap();
        assert_eq!(all, vec!["a", "b"]);

        let notes = ScopeArgs {
            conditions: vec!["kind=note".into()],
            ids: Vec::new(),
        };
        assert_eq!(run(file.path(), &notes).unwrap(), vec!["a"]);
    }

    #[test]
    fn missing_file_has_nothing_pending() {
        let file = TestStoreFile::missing("local.json");
        assert!(run(file.path(), &ScopeArgs::default()).unwrap().is_empty());
    }
}
