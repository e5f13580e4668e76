//! Listener registry and event fan-out.
//!
//! Each registered listener owns a queue drained by its own dispatch
//! thread. Dispatching only enqueues, so the session never waits for a
//! callback, a listener never runs two callbacks at once, and separate
//! listeners run concurrently. Unregistering closes the queue; events
//! already queued are still delivered.

use crate::error::{ReplicatorError, ReplicatorResult};
use crate::event::{DocumentTransferEvent, StatusEvent};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tracing::{debug, warn};

/// Handle returned on registration, used only to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(u64);

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}

type Registry<E> = RwLock<BTreeMap<ListenerToken, Sender<E>>>;

/// Fans status and document events out to registered listeners.
pub struct EventDispatcher {
    next_token: AtomicU64,
    status_listeners: Registry<StatusEvent>,
    document_listeners: Registry<DocumentTransferEvent>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            status_listeners: RwLock::new(BTreeMap::new()),
            document_listeners: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a status listener.
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the dispatch thread cannot be started.
    pub fn register_status_listener<F>(&self, callback: F) -> ReplicatorResult<ListenerToken>
    where
        F: Fn(&StatusEvent) + Send + 'static,
    {
        self.register(&self.status_listeners, "status", callback)
    }

    /// Registers a document transfer listener.
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the dispatch thread cannot be started.
    pub fn register_document_listener<F>(&self, callback: F) -> ReplicatorResult<ListenerToken>
    where
        F: Fn(&DocumentTransferEvent) + Send + 'static,
    {
        self.register(&self.document_listeners, "document", callback)
    }

    /// Unregisters a listener of either kind.
    ///
    /// Returns false if the token was unknown or already unregistered.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        let removed = self.status_listeners.write().remove(&token).is_some()
            || self.document_listeners.write().remove(&token).is_some();
        if removed {
            debug!(%token, "listener removed");
        }
        removed
    }

    /// Queues a status event for every status listener.
    pub fn dispatch_status(&self, event: &StatusEvent) {
        Self::fan_out(&self.status_listeners, event);
    }

    /// Queues a document event for every document listener.
    pub fn dispatch_document(&self, event: &DocumentTransferEvent) {
        Self::fan_out(&self.document_listeners, event);
    }

    /// Returns the number of registered listeners of both kinds.
    pub fn listener_count(&self) -> usize {
        self.status_listeners.read().len() + self.document_listeners.read().len()
    }

    fn register<E, F>(
        &self,
        registry: &Registry<E>,
        kind: &'static str,
        callback: F,
    ) -> ReplicatorResult<ListenerToken>
    where
        E: Send + 'static,
        F: Fn(&E) + Send + 'static,
    {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel::<E>();

        thread::Builder::new()
            .name(format!("docsync-{kind}-{}", token.0))
            .spawn(move || {
                for event in rx {
                    callback(&event);
                }
            })
            .map_err(|e| ReplicatorError::ThreadSpawn(e.to_string()))?;

        // Only published once the dispatch thread exists.
        registry.write().insert(token, tx);
        debug!(%token, kind, "listener registered");
        Ok(token)
    }

    fn fan_out<E: Clone>(registry: &Registry<E>, event: &E) {
        let mut listeners = registry.write();
        listeners.retain(|token, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                warn!(%token, "listener thread gone; dropping registration");
            }
            alive
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLevel;
    use crate::event::{Progress, TransferDirection};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn status(activity: ActivityLevel) -> StatusEvent {
        StatusEvent {
            activity,
            progress: Progress::default(),
            pending: None,
            error: None,
        }
    }

    #[test]
    fn delivers_in_order() {
        let dispatcher = EventDispatcher::new();
        let (tx, rx) = mpsc::channel();
        dispatcher
            .register_status_listener(move |event| tx.send(event.activity).unwrap())
            .unwrap();

        let levels = [
            ActivityLevel::Connecting,
            ActivityLevel::Busy,
            ActivityLevel::Idle,
            ActivityLevel::Busy,
            ActivityLevel::Stopped,
        ];
        for level in levels {
            dispatcher.dispatch_status(&status(level));
        }

        let received: Vec<_> = (0..levels.len())
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(received, levels);
    }

    #[test]
    fn no_backlog_for_late_listener() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch_status(&status(ActivityLevel::Connecting));

        let (tx, rx) = mpsc::channel();
        dispatcher
            .register_status_listener(move |event| tx.send(event.activity).unwrap())
            .unwrap();
        dispatcher.dispatch_status(&status(ActivityLevel::Busy));

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            ActivityLevel::Busy
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn unregister_is_idempotent() {
        let dispatcher = EventDispatcher::new();
        let status = dispatcher.register_status_listener(|_| {}).unwrap();
        let document = dispatcher.register_document_listener(|_| {}).unwrap();
        assert_ne!(status, document);
        assert_eq!(dispatcher.listener_count(), 2);

        assert!(dispatcher.unregister(status));
        assert!(!dispatcher.unregister(status));
        assert!(dispatcher.unregister(document));
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn unregistered_listener_gets_nothing_new() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let token = dispatcher
            .register_document_listener(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        dispatcher.unregister(token);

        dispatcher.dispatch_document(&DocumentTransferEvent::completed(
            "a".into(),
            TransferDirection::Push,
            false,
        ));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callbacks_of_one_listener_never_overlap() {
        let dispatcher = EventDispatcher::new();
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();

        let (a, o) = (Arc::clone(&active), Arc::clone(&overlaps));
        dispatcher
            .register_document_listener(move |_| {
                if a.fetch_add(1, Ordering::SeqCst) > 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(1));
                a.fetch_sub(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            })
            .unwrap();

        let dispatcher = Arc::new(dispatcher);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for i in 0..5 {
                        dispatcher.dispatch_document(&DocumentTransferEvent::completed(
                            format!("doc-{p}-{i}").into(),
                            TransferDirection::Push,
                            false,
                        ));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        for _ in 0..20 {
            done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
