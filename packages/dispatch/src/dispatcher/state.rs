// packages/dispatch/src/dispatcher/state.rs
//! Dispatcher lifecycle
//!
//! ```text
//! Created ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──worker exit──▶ Stopped
//! ```
//!
//! No transition skips a state.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle state of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherState::Created => "created",
            DispatcherState::Running => "running",
            DispatcherState::ShuttingDown => "shutting-down",
            DispatcherState::Stopped => "stopped",
        }
    }

    /// `bind`/`unbind` are legal only before shutdown starts
    pub fn accepts_bindings(&self) -> bool {
        matches!(self, DispatcherState::Created | DispatcherState::Running)
    }

    /// The single legal successor of this state
    pub fn next(&self) -> Option<DispatcherState> {
        match self {
            DispatcherState::Created => Some(DispatcherState::Running),
            DispatcherState::Running => Some(DispatcherState::ShuttingDown),
            DispatcherState::ShuttingDown => Some(DispatcherState::Stopped),
            DispatcherState::Stopped => None,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State cell shared by the dispatcher and its worker thread
pub(crate) struct Lifecycle {
    state: Mutex<DispatcherState>,
    changed: Condvar,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DispatcherState::Created),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> DispatcherState {
        *self.state.lock()
    }

    /// Lock the state for a compound check-and-advance
    pub(crate) fn lock(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock()
    }

    /// Move to the successor state and wake waiters
    pub(crate) fn advance(&self, guard: &mut MutexGuard<'_, DispatcherState>) -> DispatcherState {
        let next = guard
            .next()
            .unwrap_or(DispatcherState::Stopped);
        **guard = next;
        self.changed.notify_all();
        next
    }

    /// Block until the state reaches `Stopped`
    pub(crate) fn wait_stopped(&self) {
        let mut state = self.state.lock();
        while *state != DispatcherState::Stopped {
            self.changed.wait(&mut state);
        }
    }

    /// Block until `Stopped` or the timeout elapses; true if stopped
    pub(crate) fn wait_stopped_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != DispatcherState::Stopped {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == DispatcherState::Stopped;
            }
        }
        true
    }
}
