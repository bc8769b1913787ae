//! Server lifecycle state and signal mapping.

use std::sync::Arc;

use signal_hook::consts::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};

use crate::lifecycle::signals::SignalQueue;

/// Coarse lifecycle state, checked once per cycle.
///
/// Transitions are strictly linear: `Running → ShuttingDown → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Running,
    /// Shutdown requested; the next cycle halts the loop.
    ShuttingDown,
    Stopped,
}

/// What a dequeued signal means to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    Terminate,
    Interrupt,
    Quit,
    Hangup,
    ChildReaped,
    User,
    Unknown,
}

/// Signals that request shutdown.
pub const TERMINATE_SIGNALS: [i32; 1] = [SIGTERM];

pub fn classify(signal: i32) -> SignalClass {
    if TERMINATE_SIGNALS.contains(&signal) {
        return SignalClass::Terminate;
    }
    match signal {
        SIGINT => SignalClass::Interrupt,
        SIGQUIT => SignalClass::Quit,
        SIGHUP => SignalClass::Hangup,
        SIGCHLD => SignalClass::ChildReaped,
        SIGUSR1 | SIGUSR2 => SignalClass::User,
        _ => SignalClass::Unknown,
    }
}

/// Translates dequeued signals into state transitions.
#[derive(Debug)]
pub struct LifecycleController {
    state: ServerState,
    signals: Arc<SignalQueue>,
}

impl LifecycleController {
    pub fn new(signals: Arc<SignalQueue>) -> Self {
        Self {
            state: ServerState::Running,
            signals,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Move forward to `next`. Backward or repeated transitions are ignored.
    fn advance(&mut self, next: ServerState) -> bool {
        if next <= self.state {
            return false;
        }
        tracing::info!(from = ?self.state, to = ?next, "Server state changed");
        self.state = next;
        true
    }

    /// Running → ShuttingDown.
    pub fn request_shutdown(&mut self) -> bool {
        if self.state != ServerState::Running {
            return false;
        }
        self.advance(ServerState::ShuttingDown)
    }

    /// ShuttingDown → Stopped. Called by the loop when it halts.
    pub fn mark_stopped(&mut self) -> bool {
        self.advance(ServerState::Stopped)
    }

    /// Dequeue at most one signal and apply its mapping.
    pub fn handle_pending_signal(&mut self) -> Option<SignalClass> {
        let signal = self.signals.pop()?;
        let class = classify(signal);
        match class {
            SignalClass::Terminate => {
                tracing::info!(signal, "Received SIGTERM indicating exit request");
                self.request_shutdown();
            }
            SignalClass::Unknown => {
                tracing::warn!(signal, "Ignoring unexpected signal");
            }
            other => {
                tracing::debug!(signal, class = ?other, "Signal received, no action");
            }
        }
        Some(class)
    }
}

/// Cloneable handle that requests a shutdown from outside the loop.
///
/// It enqueues SIGTERM into the same queue the signal handlers feed, so the
/// request takes effect exactly like a delivered signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    signals: Arc<SignalQueue>,
}

impl Shutdown {
    pub fn new(signals: Arc<SignalQueue>) -> Self {
        Self { signals }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.signals.record(SIGTERM);
    }
}
