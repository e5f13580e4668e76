//! Collects replicator notifications for assertions.

use docsync_replicator::{
    ActivityLevel, DocumentTransferEvent, ListenerToken, Replicator, StatusEvent,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One recorded status event together with what the listener saw when
/// it queried the replicator from inside the callback.
#[derive(Debug, Clone)]
pub struct RecordedStatus {
    /// The event as delivered.
    pub event: StatusEvent,
    /// Size of `pending_document_ids()` queried inside the callback, or
    /// `None` if the query failed.
    pub queried_pending: Option<usize>,
}

impl RecordedStatus {
    /// Size of the pending snapshot carried by the event.
    pub fn pending_len(&self) -> Option<usize> {
        self.event.pending.as_ref().map(|p| p.len())
    }
}

#[derive(Default)]
struct Recorded {
    statuses: Vec<RecordedStatus>,
    documents: Vec<DocumentTransferEvent>,
}

/// Records every status and document event of one replicator.
pub struct EventRecorder {
    recorded: Arc<(Mutex<Recorded>, Condvar)>,
    tokens: Vec<ListenerToken>,
}

impl EventRecorder {
    /// Registers a change listener and a document listener on `replicator`.
    pub fn attach(replicator: &Replicator) -> Self {
        let recorded = Arc::new((Mutex::new(Recorded::default()), Condvar::new()));

        let sink = Arc::clone(&recorded);
        let status_token = replicator
            .add_change_listener(move |change| {
                let queried_pending = change
                    .replicator
                    .pending_document_ids()
                    .ok()
                    .map(|p| p.len());
                let (lock, condvar) = &*sink;
                lock.lock().statuses.push(RecordedStatus {
                    event: change.status.clone(),
                    queried_pending,
                });
                condvar.notify_all();
            })
            .expect("Failed to register change listener");

        let sink = Arc::clone(&recorded);
        let document_token = replicator
            .add_document_replication_listener(move |replication| {
                let (lock, condvar) = &*sink;
                lock.lock().documents.push(replication.event.clone());
                condvar.notify_all();
            })
            .expect("Failed to register document listener");

        Self {
            recorded,
            tokens: vec![status_token, document_token],
        }
    }

    /// Returns the listener tokens, status listener first.
    pub fn tokens(&self) -> &[ListenerToken] {
        &self.tokens
    }

    /// Returns the status events recorded so far.
    pub fn statuses(&self) -> Vec<RecordedStatus> {
        self.recorded.0.lock().statuses.clone()
    }

    /// Returns the activity levels recorded so far.
    pub fn levels(&self) -> Vec<ActivityLevel> {
        self.recorded
            .0
            .lock()
            .statuses
            .iter()
            .map(|s| s.event.activity)
            .collect()
    }

    /// Returns the document events recorded so far.
    pub fn documents(&self) -> Vec<DocumentTransferEvent> {
        self.recorded.0.lock().documents.clone()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        let mut recorded = self.recorded.0.lock();
        recorded.statuses.clear();
        recorded.documents.clear();
    }

    /// Waits until `level` has been recorded `count` times.
    pub fn wait_for_level_count(
        &self,
        level: ActivityLevel,
        count: usize,
        timeout: Duration,
    ) -> bool {
        self.wait_until(timeout, |statuses, _| {
            statuses.iter().filter(|s| s.event.activity == level).count() >= count
        })
    }

    /// Waits until `level` has been recorded at least once.
    pub fn wait_for_level(&self, level: ActivityLevel, timeout: Duration) -> bool {
        self.wait_for_level_count(level, 1, timeout)
    }

    /// Waits until `count` document events have been recorded.
    pub fn wait_for_documents(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |_, documents| documents.len() >= count)
    }

    fn wait_until<F>(&self, timeout: Duration, done: F) -> bool
    where
        F: Fn(&[RecordedStatus], &[DocumentTransferEvent]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let (lock, condvar) = &*self.recorded;
        let mut recorded = lock.lock();
        loop {
            if done(&recorded.statuses, &recorded.documents) {
                return true;
            }
            if condvar.wait_until(&mut recorded, deadline).timed_out() {
                return done(&recorded.statuses, &recorded.documents);
            }
        }
    }
}
