//! Events delivered to replicator listeners.

use crate::activity::ActivityLevel;
use crate::error::{ReplicatorError, ReplicatorResult};
use docsync_store::DocumentId;
use std::collections::BTreeSet;

/// Transfer counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Transfers attempted so far, successful or not.
    pub completed: u64,
    /// Transfers known so far.
    pub total: u64,
    /// Documents transferred successfully.
    pub document_count: u64,
}

/// Current status of a replicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorStatus {
    /// Activity level.
    pub activity: ActivityLevel,
    /// Transfer counters.
    pub progress: Progress,
    /// Error attached to the last transition, if any.
    pub error: Option<ReplicatorError>,
}

impl ReplicatorStatus {
    /// Status of a replicator that has never been started.
    pub fn stopped() -> Self {
        Self {
            activity: ActivityLevel::Stopped,
            progress: Progress::default(),
            error: None,
        }
    }
}

/// Emitted once per activity-level transition.
///
/// `pending` is a copy of the pending set taken at the instant of the
/// transition. It is `None` for pull-only sessions, which have no pending
/// notion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Level entered.
    pub activity: ActivityLevel,
    /// Transfer counters at the transition.
    pub progress: Progress,
    /// Pending identifiers at the transition.
    pub pending: Option<BTreeSet<DocumentId>>,
    /// Error that caused the transition, if any.
    pub error: Option<ReplicatorError>,
}

impl StatusEvent {
    /// Returns the pending snapshot carried by this event.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for pull-only sessions.
    pub fn pending_document_ids(&self) -> ReplicatorResult<&BTreeSet<DocumentId>> {
        self.pending.as_ref().ok_or_else(|| {
            ReplicatorError::unsupported(
                "pending_document_ids",
                "pending documents are only tracked when pushing",
            )
        })
    }

    /// Returns the status part of the event.
    pub fn status(&self) -> ReplicatorStatus {
        ReplicatorStatus {
            activity: self.activity,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

/// Direction of a single document transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Local to peer.
    Push,
    /// Peer to local.
    Pull,
}

/// Emitted when a single document transfer finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTransferEvent {
    /// Document transferred.
    pub document_id: DocumentId,
    /// Direction of the transfer.
    pub direction: TransferDirection,
    /// True if a deletion was transferred.
    pub deleted: bool,
    /// Set when the transfer failed.
    pub error: Option<ReplicatorError>,
}

impl DocumentTransferEvent {
    /// A successful transfer.
    pub fn completed(document_id: DocumentId, direction: TransferDirection, deleted: bool) -> Self {
        Self {
            document_id,
            direction,
            deleted,
            error: None,
        }
    }

    /// A failed transfer.
    pub fn failed(
        document_id: DocumentId,
        direction: TransferDirection,
        deleted: bool,
        error: ReplicatorError,
    ) -> Self {
        Self {
            document_id,
            direction,
            deleted,
            error: Some(error),
        }
    }

    /// Returns true if the transfer succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
