//! Push, pull and sync commands.

use super::ScopeArgs;
use crate::error::{CliError, CliResult};
use crate::store_file;
use docsync_replicator::{Endpoint, Replicator, ReplicatorConfig, ReplicatorType};
use docsync_store::DocumentStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one replication run.
#[derive(Debug, Serialize)]
pub struct ReplicationReport {
    /// Direction that ran.
    pub direction: String,
    /// Live documents in the local file afterwards.
    pub local_documents: usize,
    /// Live documents in the peer file afterwards.
    pub peer_documents: usize,
    /// Documents transferred successfully.
    pub transferred: u64,
    /// Transfers that failed.
    pub failed: u64,
    /// Local documents still not replicated (push directions only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Vec<String>>,
}

/// Runs one one-shot session between two store files and writes back the
/// files that received documents. A file nothing was written to is left
/// alone.
pub fn run(
    local_path: &Path,
    peer_path: &Path,
    replicator_type: ReplicatorType,
    scope: &ScopeArgs,
    timeout_secs: u64,
) -> CliResult<ReplicationReport> {
    if local_path == peer_path {
        return Err(CliError::InvalidArgument(
            "local and peer must be different files".into(),
        ));
    }

    let local = Arc::new(store_file::load(local_path)?);
    let peer = Arc::new(store_file::load(peer_path)?);

    let config = scope.apply(
        ReplicatorConfig::new(local.clone(), Endpoint::Database(peer.clone()))
            .with_type(replicator_type),
    )?;
    let replicator = Replicator::new(config)?;
    let local_before = local.last_sequence();
    let peer_before = peer.last_sequence();
    replicator.add_document_replication_listener(|replication| {
        let event = &replication.event;
        match &event.error {
            None => info!(
                id = %event.document_id,
                direction = ?event.direction,
                deleted = event.deleted,
                "replicated"
            ),
            Some(error) => warn!(id = %event.document_id, %error, "transfer failed"),
        }
    })?;

    replicator.start()?;
    if !replicator.wait_for_stopped(Duration::from_secs(timeout_secs)) {
        replicator.stop();
        return Err(CliError::Timeout(timeout_secs));
    }

    let status = replicator.status();
    if let Some(error) = status.error {
        return Err(error.into());
    }

    if replicator_type.includes_push() && peer.last_sequence() != peer_before {
        store_file::save(peer_path, &peer)?;
    }
    if replicator_type.includes_pull() && local.last_sequence() != local_before {
        store_file::save(local_path, &local)?;
    }

    let pending = if replicator_type.includes_push() {
        Some(
            replicator
                .pending_document_ids()?
                .into_iter()
                .map(|id| id.to_string())
                .collect(),
        )
    } else {
        None
    };

    Ok(ReplicationReport {
        direction: direction_name(replicator_type).to_string(),
        local_documents: local.count()?,
        peer_documents: peer.count()?,
        transferred: status.progress.document_count,
        failed: status.progress.completed - status.progress.document_count,
        pending,
    })
}

/// Prints a report as text or JSON.
pub fn print(report: &ReplicationReport, format: &str) -> CliResult<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            println!("{json}");
        }
        _ => {
            println!("=== {} ===", report.direction);
            println!("Transferred: {}", report.transferred);
            println!("Failed: {}", report.failed);
            println!("Local documents: {}", report.local_documents);
            println!("Peer documents: {}", report.peer_documents);
            if let Some(pending) = &report.pending {
                println!("Pending: {}", pending.len());
                for id in pending {
                    println!("  {id}");
                }
            }
        }
    }
    Ok(())
}

fn direction_name(replicator_type: ReplicatorType) -> &'static str {
    match replicator_type {
        ReplicatorType::Push => "push",
        ReplicatorType::Pull => "pull",
        ReplicatorType::PushAndPull => "sync",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_store::Document;
    use docsync_testkit::TestStoreFile;

    fn notes(prefix: &str, count: usize) -> Vec<Document> {
        (0..count)
            .map(|i| Document::new(format!("{prefix}-{i}")).with_string("kind", "note"))
            .collect()
    }

    #[test]
    fn push_creates_peer_file() {
        let local = TestStoreFile::with_documents("local.json", &notes("a", 3));
        let peer = TestStoreFile::missing("peer.json");

        let report = run(
            local.path(),
            peer.path(),
            ReplicatorType::Push,
            &ScopeArgs::default(),
            10,
        )
        .unwrap();

        assert_eq!(report.transferred, 3);
        assert_eq!(report.peer_documents, 3);
        assert_eq!(report.pending, Some(Vec::new()));
        assert_eq!(peer.read().len(), 3);
    }

    #[test]
    fn sync_merges_both_files() {
        let local = TestStoreFile::with_documents("local.json", &notes("a", 2));
        let peer = TestStoreFile::with_documents("peer.json", &notes("b", 2));

        let report = run(
            local.path(),
            peer.path(),
            ReplicatorType::PushAndPull,
            &ScopeArgs::default(),
            10,
        )
        .unwrap();

        assert_eq!(report.direction, "sync");
        assert_eq!(report.local_documents, 4);
        assert_eq!(report.peer_documents, 4);
        assert_eq!(local.read().len(), 4);
        assert_eq!(peer.read().len(), 4);
    }

    #[test]
    fn pull_leaves_peer_untouched() {
        let local = TestStoreFile::missing("local.json");
        let peer = TestStoreFile::with_documents("peer.json", &notes("b", 2));
        let before = peer.read();

        let report = run(
            local.path(),
            peer.path(),
            ReplicatorType::Pull,
            &ScopeArgs::default(),
            10,
        )
        .unwrap();

        assert!(report.pending.is_none());
        assert_eq!(local.read().len(), 2);
        assert_eq!(peer.read(), before);
    }

    #[test]
    fn scope_limits_push() {
        let mut documents = notes("a", 2);
        documents.push(Document::new("todo-0").with_string("kind", "todo"));
        let local = TestStoreFile::with_documents("local.json", &documents);
        let peer = TestStoreFile::missing("peer.json");
        let scope = ScopeArgs {
            conditions: vec!["kind=todo".into()],
            ids: Vec::new(),
        };

        let report = run(local.path(), peer.path(), ReplicatorType::Push, &scope, 10).unwrap();
        assert_eq!(report.peer_documents, 1);
    }

    #[test]
    fn same_file_is_rejected() {
        let local = TestStoreFile::missing("local.json");
        let err = run(
            local.path(),
            local.path(),
            ReplicatorType::Push,
            &ScopeArgs::default(),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn nothing_transferred_writes_no_file() {
        let local = TestStoreFile::missing("local.json");
        let peer = TestStoreFile::missing("peer.json");

        let report = run(
            local.path(),
            peer.path(),
            ReplicatorType::PushAndPull,
            &ScopeArgs::default(),
            10,
        )
        .unwrap();

        assert_eq!(report.transferred, 0);
        assert!(!local.path().exists());
        assert!(!peer.path().exists());
    }

    #[test]
    fn up_to_date_peer_file_is_not_rewritten() {
        let local = TestStoreFile::with_documents("local.json", &notes("a", 2));
        let peer = TestStoreFile::missing("peer.json");
        let push = || {
            run(
                local.path(),
                peer.path(),
                ReplicatorType::Push,
                &ScopeArgs::default(),
                10,
            )
            .unwrap()
        };
        push();

        // Compact JSON differs from what a save writes, so a rewrite shows.
        let compact = serde_json::to_string(&peer.read()).unwrap();
        std::fs::write(peer.path(), &compact).unwrap();

        let report = push();
        assert_eq!(report.peer_documents, 2);
        assert_eq!(std::fs::read_to_string(peer.path()).unwrap(), compact);
    }
}
