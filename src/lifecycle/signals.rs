//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGCHLD, SIGUSR2
//! - Record each delivered signal number in a de-duplicating FIFO
//! - Let the event loop drain that FIFO, one signal per cycle
//!
//! # Design Decisions
//! - The handler only performs atomic operations: no logging, allocation or
//!   locking happens in signal context
//! - One slot per possible signal number, so the queue can never overflow
//! - A number already queued is not recorded again until it is dequeued

use std::io;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR2};
use signal_hook::SigId;

/// Signals the server installs handlers for.
pub const HANDLED_SIGNALS: [i32; 6] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGCHLD, SIGUSR2];

const CAPACITY: usize = 64;

fn bit(signal: i32) -> u64 {
    1u64 << (signal as u32 % 64)
}

/// Bounded, de-duplicating FIFO of raw signal numbers.
///
/// Written from signal handlers, drained by the event loop thread.
#[derive(Debug)]
pub struct SignalQueue {
    slots: [AtomicI32; CAPACITY],
    queued: AtomicU64,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicI32::new(0)),
            queued: AtomicU64::new(0),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Record a signal number unless it is already queued.
    ///
    /// Async-signal-safe. Returns `true` if the number was enqueued.
    pub fn record(&self, signal: i32) -> bool {
        if signal <= 0 {
            return false;
        }
        let mask = bit(signal);
        if self.queued.fetch_or(mask, Ordering::SeqCst) & mask != 0 {
            return false;
        }
        let slot = self.tail.fetch_add(1, Ordering::SeqCst) % CAPACITY;
        self.slots[slot].store(signal, Ordering::SeqCst);
        true
    }

    /// Dequeue the oldest recorded signal.
    ///
    /// Must only be called from one thread.
    pub fn pop(&self) -> Option<i32> {
        let head = self.head.load(Ordering::SeqCst);
        let signal = self.slots[head % CAPACITY].swap(0, Ordering::SeqCst);
        if signal == 0 {
            return None;
        }
        self.head.store(head + 1, Ordering::SeqCst);
        self.queued.fetch_and(!bit(signal), Ordering::SeqCst);
        Some(signal)
    }

    /// Number of recorded but not yet dequeued signals.
    pub fn len(&self) -> usize {
        self.tail
            .load(Ordering::SeqCst)
            .saturating_sub(self.head.load(Ordering::SeqCst))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Installed signal handlers. Dropping the guard unregisters them.
#[derive(Debug)]
pub struct SignalGuard {
    ids: Vec<SigId>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Route every signal in [`HANDLED_SIGNALS`] into `queue`.
pub fn install(queue: &Arc<SignalQueue>) -> io::Result<SignalGuard> {
    let mut guard = SignalGuard { ids: Vec::new() };
    for signal in HANDLED_SIGNALS {
        let queue = Arc::clone(queue);
        // SAFETY: the action only touches atomics inside `SignalQueue`, which
        // is async-signal-safe.
        let id = unsafe {
            signal_hook::low_level::register(signal, move || {
                queue.record(signal);
            })
        }?;
        guard.ids.push(id);
    }
    tracing::debug!(signals = ?HANDLED_SIGNALS, "Signal handlers installed");
    Ok(guard)
}
