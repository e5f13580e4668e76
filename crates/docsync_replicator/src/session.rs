//! The worker that drives one replication session.
//!
//! A session connects, pulls everything new from the peer, then pushes the
//! pending documents and the deletion outbox. One-shot sessions stop after
//! that pass; continuous sessions go IDLE and wake up when the local change
//! feed or the peer has something new.

use crate::activity::{ActivityLevel, ActivityStateMachine};
use crate::config::ReplicatorConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::event::{DocumentTransferEvent, TransferDirection};
use crate::pending::PendingDocumentTracker;
use crate::scope::ReplicationScope;
use crate::transport::PeerTransport;
use docsync_store::{ChangeEvent, ChangeType, Document, DocumentId, StoreError};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stop request shared between the session and its owner.
struct StopSignal {
    requested: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            requested: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn request(&self) {
        *self.requested.lock() = true;
        self.condvar.notify_all();
    }

    fn is_requested(&self) -> bool {
        *self.requested.lock()
    }

    /// Sleeps up to `timeout`. Returns true if a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut requested = self.requested.lock();
        if !*requested {
            let _ = self
                .condvar
                .wait_while_for(&mut requested, |r| !*r, timeout);
        }
        *requested
    }
}

pub(crate) struct Session {
    config: ReplicatorConfig,
    scope: Arc<ReplicationScope>,
    tracker: Option<Arc<PendingDocumentTracker>>,
    machine: ActivityStateMachine,
    transport: Arc<dyn PeerTransport>,
    checkpoint: Arc<AtomicU64>,
    stop: StopSignal,
    // Documents whose last transfer failed. Retried after a local change
    // or a reconnect.
    failed: Mutex<BTreeSet<DocumentId>>,
    // Local deletions not yet acknowledged by the peer.
    deletions: Mutex<BTreeSet<DocumentId>>,
}

impl Session {
    /// Builds a session and seeds its pending set from the local store.
    ///
    /// The caller subscribes to the change feed before this runs, so no
    /// write can fall between the seed and the feed.
    pub(crate) fn new(
        config: ReplicatorConfig,
        transport: Arc<dyn PeerTransport>,
        dispatcher: Arc<EventDispatcher>,
        checkpoint: Arc<AtomicU64>,
    ) -> ReplicatorResult<Self> {
        let scope = Arc::new(ReplicationScope::from_config(&config));
        let pushes = scope.replicator_type().includes_push();

        let tracker = if pushes {
            Some(Arc::new(PendingDocumentTracker::new(
                Arc::clone(&scope),
                Arc::clone(&config.database),
            )?))
        } else {
            None
        };

        let deletions: BTreeSet<DocumentId> = if pushes {
            config
                .database
                .iter_changes(0)?
                .filter(|doc| doc.is_deleted() && scope.admits_id(doc.id()))
                .map(|doc| doc.id().clone())
                .collect()
        } else {
            BTreeSet::new()
        };

        let machine = ActivityStateMachine::new(tracker.clone(), dispatcher);
        Ok(Self {
            config,
            scope,
            tracker,
            machine,
            transport,
            checkpoint,
            stop: StopSignal::new(),
            failed: Mutex::new(BTreeSet::new()),
            deletions: Mutex::new(deletions),
        })
    }

    pub(crate) fn machine(&self) -> &ActivityStateMachine {
        &self.machine
    }

    pub(crate) fn tracker(&self) -> Option<&Arc<PendingDocumentTracker>> {
        self.tracker.as_ref()
    }

    pub(crate) fn request_stop(&self) {
        self.stop.request();
    }

    /// Runs the session to completion on the calling thread.
    pub(crate) fn run(&self, changes: Receiver<ChangeEvent>) {
        info!(
            endpoint = self.scope.endpoint(),
            replicator_type = ?self.scope.replicator_type(),
            continuous = self.config.continuous,
            "replication session started"
        );

        // A panicking transport or store must still leave the session STOPPED.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive(&changes)))
            .unwrap_or_else(|payload| {
                Err(ReplicatorError::WorkerPanicked(panic_message(payload.as_ref())))
            });
        self.transport.disconnect();

        let error = match outcome {
            Ok(()) => None,
            Err(e) => {
                error!(endpoint = self.scope.endpoint(), error = %e, "replication session failed");
                Some(e)
            }
        };
        let progress = self.machine.status().progress;
        self.machine.stop(error);
        info!(
            endpoint = self.scope.endpoint(),
            completed = progress.completed,
            documents = progress.document_count,
            "replication session stopped"
        );
    }

    /// Connects and replicates, reconnecting after connectivity failures.
    fn drive(&self, changes: &Receiver<ChangeEvent>) -> ReplicatorResult<()> {
        let mut attempt: u32 = 0;

        loop {
            if self.stop.is_requested() {
                return Ok(());
            }

            let failure = match self.transport.connect() {
                Ok(()) => {
                    debug!(endpoint = self.scope.endpoint(), "connected");
                    if self.config.continuous {
                        attempt = 0;
                    }
                    match self.replicate(changes) {
                        Ok(()) => return Ok(()),
                        Err(e) if e.is_retryable() => e,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            attempt = attempt.saturating_add(1);
            warn!(
                endpoint = self.scope.endpoint(),
                attempt,
                error = %failure,
                "peer unreachable"
            );
            self.machine
                .transition(ActivityLevel::Offline, Some(failure.clone()))?;

            if !self.config.continuous && attempt >= self.config.retry.max_attempts {
                return Err(failure);
            }
            if self.stop.wait(self.config.retry.delay_for_attempt(attempt)) {
                return Ok(());
            }

            // A fresh connection retries everything that failed before.
            self.failed.lock().clear();
            self.machine.transition(ActivityLevel::Connecting, None)?;
        }
    }

    /// Runs BUSY passes until done (one-shot) or stopped (continuous).
    fn replicate(&self, changes: &Receiver<ChangeEvent>) -> ReplicatorResult<()> {
        self.machine.transition(ActivityLevel::Busy, None)?;

        loop {
            self.drain_changes(changes)?;
            self.pass()?;

            if self.stop.is_requested() || !self.config.continuous {
                return Ok(());
            }

            self.drain_changes(changes)?;
            if self.has_outstanding() {
                continue;
            }

            self.machine.transition(ActivityLevel::Idle, None)?;
            if !self.wait_for_work(changes)? {
                return Ok(());
            }
            self.machine.transition(ActivityLevel::Busy, None)?;
        }
    }

    /// One pull-then-push pass.
    fn pass(&self) -> ReplicatorResult<()> {
        if self.scope.replicator_type().includes_pull() {
            self.pull_all()?;
        }
        if let Some(tracker) = &self.tracker {
            self.push_pending(tracker)?;
            self.push_deletions()?;
        }
        Ok(())
    }

    /// Blocks while IDLE. Returns false if the session should end.
    fn wait_for_work(&self, changes: &Receiver<ChangeEvent>) -> ReplicatorResult<bool> {
        loop {
            if self.stop.is_requested() {
                return Ok(false);
            }

            match changes.recv_timeout(self.config.poll_interval) {
                Ok(event) => {
                    self.apply_change(&event)?;
                    self.drain_changes(changes)?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(endpoint = self.scope.endpoint(), "local change feed closed");
                    return Ok(false);
                }
            }

            if self.stop.is_requested() {
                return Ok(false);
            }
            if self.has_outstanding() || self.peer_has_changes()? {
                return Ok(true);
            }
        }
    }

    /// True if the peer holds a revision this session would apply.
    ///
    /// Batches holding only echoes of earlier pushes or out-of-scope
    /// documents are skipped by moving the checkpoint past them.
    fn peer_has_changes(&self) -> ReplicatorResult<bool> {
        if !self.scope.replicator_type().includes_pull() {
            return Ok(false);
        }
        loop {
            let checkpoint = self.checkpoint.load(Ordering::SeqCst);
            let batch = self.transport.pull(checkpoint, self.config.batch_size)?;
            for document in &batch.documents {
                if self.should_apply(document)? {
                    return Ok(true);
                }
            }
            self.checkpoint.store(batch.checkpoint, Ordering::SeqCst);
            if !batch.has_more {
                return Ok(false);
            }
        }
    }

    /// True if a push is owed that has not already failed.
    ///
    /// Documents whose push failed on this connection do not count, so a
    /// continuous session holding only rejected documents goes IDLE. They
    /// are retried after a local change or a reconnect.
    fn has_outstanding(&self) -> bool {
        let failed = self.failed.lock();
        let pending = self
            .tracker
            .as_ref()
            .is_some_and(|t| t.snapshot().iter().any(|id| !failed.contains(id)));
        pending || self.deletions.lock().iter().any(|id| !failed.contains(id))
    }

    fn drain_changes(&self, changes: &Receiver<ChangeEvent>) -> ReplicatorResult<()> {
        for event in changes.try_iter() {
            self.apply_change(&event)?;
        }
        Ok(())
    }

    /// Feeds one local store change into the pending set.
    fn apply_change(&self, event: &ChangeEvent) -> ReplicatorResult<()> {
        let Some(tracker) = &self.tracker else {
            return Ok(());
        };
        let id = &event.document_id;

        match event.change_type {
            ChangeType::Delete => {
                tracker.on_document_deleted(id);
                self.failed.lock().remove(id);
                if event.is_local() && self.scope.admits_id(id) {
                    self.deletions.lock().insert(id.clone());
                }
            }
            ChangeType::Insert | ChangeType::Update => {
                // Writes pulled from a peer are already there.
                if !event.is_local() {
                    return Ok(());
                }
                self.failed.lock().remove(id);
                self.deletions.lock().remove(id);
                if tracker.on_document_created_or_updated(id)? {
                    self.machine.add_total(1);
                }
            }
        }
        Ok(())
    }

    fn pull_all(&self) -> ReplicatorResult<()> {
        loop {
            if self.stop.is_requested() {
                return Ok(());
            }

            let checkpoint = self.checkpoint.load(Ordering::SeqCst);
            let batch = self.transport.pull(checkpoint, self.config.batch_size)?;
            debug!(
                checkpoint,
                received = batch.documents.len(),
                has_more = batch.has_more,
                "pulled batch"
            );

            for document in batch.documents {
                self.apply_pulled(document)?;
            }
            self.checkpoint.store(batch.checkpoint, Ordering::SeqCst);

            if !batch.has_more {
                return Ok(());
            }
        }
    }

    /// True if a pulled revision is in scope and newer than the local one.
    ///
    /// A revision no newer than the local one is an echo of an earlier
    /// push, or older than a local write that has not been pushed yet.
    fn should_apply(&self, document: &Document) -> ReplicatorResult<bool> {
        let in_scope = if document.is_deleted() {
            self.scope.admits_id(document.id())
        } else {
            self.scope.matches(document)
        };
        if !in_scope {
            return Ok(false);
        }
        Ok(match self.config.database.latest(document.id())? {
            None => !document.is_deleted(),
            Some(local) if document.is_deleted() => {
                !local.is_deleted() && document.revision() > local.revision()
            }
            Some(local) => document.revision() > local.revision(),
        })
    }

    fn apply_pulled(&self, document: Document) -> ReplicatorResult<()> {
        if !self.should_apply(&document)? {
            return Ok(());
        }

        let deleted = document.is_deleted();
        let id = document.id().clone();
        let applied = if deleted {
            self.config.database.apply_replicated_deletion(&id)
        } else {
            self.config.database.apply_replicated(document)
        };

        match applied {
            Ok(false) => {}
            Ok(true) => {
                self.machine.add_total(1);
                self.machine.report_document(DocumentTransferEvent::completed(
                    id,
                    TransferDirection::Pull,
                    deleted,
                ));
            }
            Err(e @ StoreError::Closed { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(%id, error = %e, "failed to apply pulled document");
                let error = ReplicatorError::document_transfer(&id, e.to_string());
                self.machine.add_total(1);
                self.machine.report_document(DocumentTransferEvent::failed(
                    id,
                    TransferDirection::Pull,
                    deleted,
                    error,
                ));
            }
        }
        Ok(())
    }

    fn push_pending(&self, tracker: &PendingDocumentTracker) -> ReplicatorResult<()> {
        for id in tracker.snapshot() {
            if self.stop.is_requested() {
                return Ok(());
            }
            if self.failed.lock().contains(&id) {
                continue;
            }

            let Some(document) = self.config.database.get(&id)? else {
                tracker.on_document_deleted(&id);
                continue;
            };
            if !self.scope.matches(&document) {
                tracker.on_document_created_or_updated(&id)?;
                continue;
            }

            match self.transport.push(&document) {
                Ok(_) => {
                    // Confirm before reporting so listeners never see a
                    // replicated document still pending.
                    tracker.on_revision_confirmed(&id, document.sequence());
                    debug!(%id, revision = document.revision(), "pushed document");
                    self.machine.report_document(DocumentTransferEvent::completed(
                        id,
                        TransferDirection::Push,
                        false,
                    ));
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => self.record_push_failure(id, false, e),
            }
        }
        Ok(())
    }

    fn push_deletions(&self) -> ReplicatorResult<()> {
        let outbox: Vec<DocumentId> = self.deletions.lock().iter().cloned().collect();

        for id in outbox {
            if self.stop.is_requested() {
                return Ok(());
            }
            if self.failed.lock().contains(&id) {
                continue;
            }
            // Recreated since the deletion; the live revision is pushed instead.
            if self.config.database.exists(&id)? {
                self.deletions.lock().remove(&id);
                continue;
            }

            match self.transport.push(&Document::tombstone(id.clone(), 0)) {
                Ok(changed) => {
                    self.deletions.lock().remove(&id);
                    if changed {
                        debug!(%id, "pushed deletion");
                        self.machine.report_document(DocumentTransferEvent::completed(
                            id,
                            TransferDirection::Push,
                            true,
                        ));
                    }
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => self.record_push_failure(id, true, e),
            }
        }
        Ok(())
    }

    fn record_push_failure(&self, id: DocumentId, deleted: bool, error: ReplicatorError) {
        warn!(%id, error = %error, "push failed; document stays pending");
        self.failed.lock().insert(id.clone());
        self.machine.report_document(DocumentTransferEvent::failed(
            id,
            TransferDirection::Push,
            deleted,
            error,
        ));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
