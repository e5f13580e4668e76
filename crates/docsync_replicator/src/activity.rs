//! Activity-level state machine of a replication session.
//!
//! ```text
//! CONNECTING -> BUSY | OFFLINE | STOPPED
//! BUSY       -> IDLE | OFFLINE | STOPPED
//! IDLE       -> BUSY | OFFLINE | STOPPED
//! OFFLINE    -> CONNECTING | STOPPED
//! STOPPED    (terminal)
//! ```
//!
//! Every accepted transition emits exactly one [`StatusEvent`] carrying the
//! pending snapshot of that instant. Transitions and document events are
//! serialized through one lock, so listeners observe them in the order the
//! session produced them. Nothing is emitted once STOPPED is entered.

use crate::dispatch::EventDispatcher;
use crate::error::{ReplicatorError, ReplicatorResult};
use crate::event::{DocumentTransferEvent, Progress, ReplicatorStatus, StatusEvent};
use crate::pending::PendingDocumentTracker;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Coarse lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityLevel {
    /// Session finished or never started.
    Stopped,
    /// Peer unreachable; a reconnect is scheduled.
    Offline,
    /// Contacting the peer.
    Connecting,
    /// Connected with nothing outstanding.
    Idle,
    /// Connected with transfers outstanding.
    Busy,
}

impl ActivityLevel {
    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ActivityLevel) -> bool {
        use ActivityLevel::*;
        match self {
            Connecting => matches!(next, Busy | Offline | Stopped),
            Busy => matches!(next, Idle | Offline | Stopped),
            Idle => matches!(next, Busy | Offline | Stopped),
            Offline => matches!(next, Connecting | Stopped),
            Stopped => false,
        }
    }

    /// Returns true for STOPPED.
    pub fn is_terminal(self) -> bool {
        self == ActivityLevel::Stopped
    }

    /// Returns true while connected to the peer.
    pub fn is_connected(self) -> bool {
        matches!(self, ActivityLevel::Busy | ActivityLevel::Idle)
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityLevel::Stopped => "STOPPED",
            ActivityLevel::Offline => "OFFLINE",
            ActivityLevel::Connecting => "CONNECTING",
            ActivityLevel::Idle => "IDLE",
            ActivityLevel::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

struct MachineState {
    level: ActivityLevel,
    progress: Progress,
    error: Option<ReplicatorError>,
    announced: bool,
}

/// Tracks and publishes the activity level of one session.
pub struct ActivityStateMachine {
    state: Mutex<MachineState>,
    stopped: Condvar,
    tracker: Option<Arc<PendingDocumentTracker>>,
    dispatcher: Arc<EventDispatcher>,
}

impl ActivityStateMachine {
    /// Creates a machine in CONNECTING.
    ///
    /// `tracker` is `None` for pull-only sessions. The CONNECTING event is
    /// emitted by [`ActivityStateMachine::announce`].
    pub fn new(
        tracker: Option<Arc<PendingDocumentTracker>>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let total = tracker.as_ref().map_or(0, |t| t.len() as u64);
        Self {
            state: Mutex::new(MachineState {
                level: ActivityLevel::Connecting,
                progress: Progress {
                    total,
                    ..Progress::default()
                },
                error: None,
                announced: false,
            }),
            stopped: Condvar::new(),
            tracker,
            dispatcher,
        }
    }

    /// Emits the CONNECTING event for the initial state. Later calls do nothing.
    pub fn announce(&self) -> Option<StatusEvent> {
        let mut state = self.state.lock();
        if state.announced || state.level != ActivityLevel::Connecting {
            return None;
        }
        state.announced = true;
        Some(self.publish(&state))
    }

    /// Moves to `to`, emitting one status event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the transition table forbids the
    /// move. Nothing is emitted in that case.
    pub fn transition(
        &self,
        to: ActivityLevel,
        error: Option<ReplicatorError>,
    ) -> ReplicatorResult<StatusEvent> {
        let mut state = self.state.lock();
        let from = state.level;
        if !from.can_transition_to(to) {
            return Err(ReplicatorError::InvalidStateTransition { from, to });
        }
        state.level = to;
        state.error = error;
        state.announced = true;
        info!(%from, %to, error = ?state.error, "activity level changed");

        let event = self.publish(&state);
        if to.is_terminal() {
            self.stopped.notify_all();
        }
        Ok(event)
    }

    /// Moves to STOPPED unless already there. Returns the emitted event.
    pub fn stop(&self, error: Option<ReplicatorError>) -> Option<StatusEvent> {
        self.transition(ActivityLevel::Stopped, error).ok()
    }

    /// Publishes a finished document transfer and updates progress.
    ///
    /// Dropped once the machine is STOPPED.
    pub fn report_document(&self, event: DocumentTransferEvent) -> bool {
        let mut state = self.state.lock();
        if state.level.is_terminal() {
            debug!(id = %event.document_id, "dropping document event after stop");
            return false;
        }
        state.progress.completed += 1;
        if event.is_success() {
            state.progress.document_count += 1;
        }
        state.progress.total = state.progress.total.max(state.progress.completed);
        self.dispatcher.dispatch_document(&event);
        true
    }

    /// Records `count` newly known transfers.
    pub fn add_total(&self, count: u64) {
        self.state.lock().progress.total += count;
    }

    /// Returns the current level.
    pub fn level(&self) -> ActivityLevel {
        self.state.lock().level
    }

    /// Returns the current status.
    pub fn status(&self) -> ReplicatorStatus {
        let state = self.state.lock();
        ReplicatorStatus {
            activity: state.level,
            progress: state.progress,
            error: state.error.clone(),
        }
    }

    /// Blocks until STOPPED is entered or the timeout elapses.
    ///
    /// Returns true if the machine is STOPPED.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.level.is_terminal() {
            let _ = self
                .stopped
                .wait_while_for(&mut state, |s| !s.level.is_terminal(), timeout);
        }
        state.level.is_terminal()
    }

    fn publish(&self, state: &MachineState) -> StatusEvent {
        let event = StatusEvent {
            activity: state.level,
            progress: state.progress,
            pending: self.tracker.as_ref().map(|t| t.snapshot()),
            error: state.error.clone(),
        };
        self.dispatcher.dispatch_status(&event);
        event
    }
}
