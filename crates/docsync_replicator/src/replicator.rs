//! The public replicator handle.

use crate::activity::ActivityLevel;
use crate::config::{Endpoint, ReplicatorConfig};
use crate::dispatch::{EventDispatcher, ListenerToken};
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::event::{DocumentTransferEvent, ReplicatorStatus, StatusEvent};
use crate::pending::PendingDocumentTracker;
use crate::scope::ReplicationScope;
use crate::session::Session;
use crate::transport::{LocalPeer, PeerTransport};
use docsync_store::DocumentId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// A status change delivered to change listeners.
#[derive(Debug, Clone)]
pub struct ReplicatorChange {
    /// The replicator that changed. Queries on it are safe from inside the
    /// listener.
    pub replicator: Replicator,
    /// The transition.
    pub status: StatusEvent,
}

/// A finished document transfer delivered to document listeners.
#[derive(Debug, Clone)]
pub struct DocumentReplication {
    /// The replicator that transferred the document.
    pub replicator: Replicator,
    /// The transfer.
    pub event: DocumentTransferEvent,
}

struct ActiveSession {
    session: Arc<Session>,
    worker: Option<JoinHandle<()>>,
}

struct ReplicatorInner {
    config: ReplicatorConfig,
    transport: Arc<dyn PeerTransport>,
    dispatcher: Arc<EventDispatcher>,
    // Pull cursor, kept across sessions of this replicator.
    checkpoint: Arc<AtomicU64>,
    current: Mutex<Option<ActiveSession>>,
}

impl Drop for ReplicatorInner {
    fn drop(&mut self) {
        if let Some(active) = self.current.get_mut() {
            active.session.request_stop();
        }
    }
}

/// Replicates documents between a local store and one peer.
///
/// Cloning yields another handle to the same replicator. Each `start`
/// runs a new session on a background thread; the pending set, activity
/// level and progress belong to that session.
///
/// # Example
///
/// ```rust
/// use docsync_replicator::{Endpoint, Replicator, ReplicatorConfig, ReplicatorType};
/// use docsync_store::{Document, DocumentStore, MemoryStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let local = Arc::new(MemoryStore::new("local"));
/// let peer = Arc::new(MemoryStore::new("peer"));
/// local.save(Document::new("doc-1").with_string("title", "hello")).unwrap();
///
/// let config = ReplicatorConfig::new(local.clone(), Endpoint::Database(peer.clone()))
///     .with_type(ReplicatorType::Push);
/// let replicator = Replicator::new(config).unwrap();
/// assert_eq!(replicator.pending_document_ids().unwrap().len(), 1);
///
/// replicator.start().unwrap();
/// assert!(replicator.wait_for_stopped(Duration::from_secs(5)));
/// assert!(replicator.pending_document_ids().unwrap().is_empty());
/// assert_eq!(peer.count().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Replicator {
    inner: Arc<ReplicatorInner>,
}

impl Replicator {
    /// Creates a stopped replicator.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: ReplicatorConfig) -> ReplicatorResult<Self> {
        config.validate()?;
        let transport: Arc<dyn PeerTransport> = match &config.endpoint {
            Endpoint::Database(store) => Arc::new(LocalPeer::new(Arc::clone(store))),
            Endpoint::Remote(transport) => Arc::clone(transport),
        };
        Ok(Self {
            inner: Arc::new(ReplicatorInner {
                config,
                transport,
                dispatcher: Arc::new(EventDispatcher::new()),
                checkpoint: Arc::new(AtomicU64::new(0)),
                current: Mutex::new(None),
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReplicatorConfig {
        &self.inner.config
    }

    /// Starts a new session.
    ///
    /// Emits CONNECTING before returning. Calling `start` while a session
    /// is running does nothing.
    ///
    /// # Errors
    ///
    /// Returns a store error if the pending set cannot be seeded, or
    /// `ThreadSpawn` if the worker cannot be started.
    pub fn start(&self) -> ReplicatorResult<()> {
        let mut current = self.inner.current.lock();

        if let Some(active) = current.as_mut() {
            if !active.session.machine().level().is_terminal() {
                warn!(
                    endpoint = %self.inner.config.endpoint.name(),
                    "replicator already running; start ignored"
                );
                return Ok(());
            }
            if let Some(worker) = active.worker.take() {
                let _ = worker.join();
            }
        }

        // Subscribe first so writes made while seeding reach the session.
        let changes = self.inner.config.database.subscribe();
        let session = Arc::new(Session::new(
            self.inner.config.clone(),
            Arc::clone(&self.inner.transport),
            Arc::clone(&self.inner.dispatcher),
            Arc::clone(&self.inner.checkpoint),
        )?);
        session.machine().announce();

        let worker_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name("docsync-replicator".into())
            .spawn(move || worker_session.run(changes));

        let worker = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                let error = ReplicatorError::ThreadSpawn(e.to_string());
                session.machine().stop(Some(error.clone()));
                *current = Some(ActiveSession {
                    session,
                    worker: None,
                });
                return Err(error);
            }
        };

        info!(endpoint = %self.inner.config.endpoint.name(), "replicator started");
        *current = Some(ActiveSession { session, worker });
        Ok(())
    }

    /// Requests the running session to stop. Idempotent.
    ///
    /// The session finishes its current transfer, then emits STOPPED.
    pub fn stop(&self) {
        if let Some(active) = self.inner.current.lock().as_ref() {
            active.session.request_stop();
        }
    }

    /// Blocks until the current session is STOPPED or the timeout elapses.
    ///
    /// Returns true if stopped. A replicator that never started is stopped.
    pub fn wait_for_stopped(&self, timeout: Duration) -> bool {
        match self.current_session() {
            Some(session) => session.machine().wait_until_stopped(timeout),
            None => true,
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> ReplicatorStatus {
        self.current_session()
            .map_or_else(ReplicatorStatus::stopped, |s| s.machine().status())
    }

    /// Returns the current activity level.
    pub fn activity_level(&self) -> ActivityLevel {
        self.current_session()
            .map_or(ActivityLevel::Stopped, |s| s.machine().level())
    }

    /// Returns the identifiers of local documents not yet replicated.
    ///
    /// Before the first start this is computed from the store; afterwards
    /// it is a copy of the session's pending set.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for pull-only replicators, at every
    /// activity level.
    pub fn pending_document_ids(&self) -> ReplicatorResult<BTreeSet<DocumentId>> {
        match self.current_tracker() {
            Some(tracker) => Ok(tracker.snapshot()),
            None => {
                let scope = ReplicationScope::from_config(&self.inner.config);
                PendingDocumentTracker::compute_initial_pending_set(
                    &scope,
                    self.inner.config.database.as_ref(),
                )
            }
        }
    }

    /// Returns true if the document is pending.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for pull-only replicators.
    pub fn is_document_pending(&self, id: &DocumentId) -> ReplicatorResult<bool> {
        match self.current_tracker() {
            Some(tracker) => Ok(tracker.contains(id)),
            None => Ok(self.pending_document_ids()?.contains(id)),
        }
    }

    /// Registers a listener for activity-level transitions.
    ///
    /// Callbacks run on a dedicated thread, one at a time, in transition
    /// order. They may call back into the replicator.
    pub fn add_change_listener<F>(&self, callback: F) -> ReplicatorResult<ListenerToken>
    where
        F: Fn(&ReplicatorChange) + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.inner.dispatcher.register_status_listener(move |status| {
            if let Some(replicator) = Self::upgrade(&weak) {
                callback(&ReplicatorChange {
                    replicator,
                    status: status.clone(),
                });
            }
        })
    }

    /// Registers a listener for finished document transfers.
    pub fn add_document_replication_listener<F>(
        &self,
        callback: F,
    ) -> ReplicatorResult<ListenerToken>
    where
        F: Fn(&DocumentReplication) + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.inner.dispatcher.register_document_listener(move |event| {
            if let Some(replicator) = Self::upgrade(&weak) {
                callback(&DocumentReplication {
                    replicator,
                    event: event.clone(),
                });
            }
        })
    }

    /// Removes a listener of either kind. Returns false if it was unknown.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.inner.dispatcher.unregister(token)
    }

    fn upgrade(weak: &Weak<ReplicatorInner>) -> Option<Replicator> {
        weak.upgrade().map(|inner| Replicator { inner })
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.inner
            .current
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.session))
    }

    fn current_tracker(&self) -> Option<Arc<PendingDocumentTracker>> {
        self.current_session()
            .and_then(|session| session.tracker().cloned())
    }
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("endpoint", &self.inner.config.endpoint.name())
            .field("replicator_type", &self.inner.config.replicator_type)
            .field("activity", &self.activity_level())
            .finish()
    }
}
