//! Cycle-batched broadcast relay.
//!
//! # Data Flow
//! ```text
//! cycle n:   Connection::on_readable → inbound buffer
//!            event loop → PendingBroadcasts::record(origin, bytes)
//! cycle n+1: distribute(pending, registry)
//!            → enqueue_outbound on every live connection except origin
//!            → pending cleared by the event loop
//! ```
//!
//! # Design Decisions
//! - One-cycle latency: nothing read in cycle n is visible before n+1
//! - An originator never receives its own bytes
//! - Targets that closed before distribution are simply absent

pub mod pending;

use std::io::{Read, Write};

use crate::event_loop::registry::ConnectionRegistry;
use crate::observability::metrics;

pub use pending::PendingBroadcasts;

/// Summary of one distribution pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Originators whose bytes were distributed.
    pub messages: usize,
    /// Individual (message, target) enqueues.
    pub deliveries: usize,
    /// Bytes enqueued across all targets.
    pub bytes: usize,
}

/// Fan every pending message out to all open connections except its
/// originator.
pub fn distribute<S: Read + Write>(
    pending: &PendingBroadcasts,
    registry: &mut ConnectionRegistry<S>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for (origin, bytes) in pending.iter() {
        report.messages += 1;
        for target in registry.iter_mut() {
            if target.id() == origin || !target.is_open() {
                continue;
            }
            target.enqueue_outbound(bytes);
            report.deliveries += 1;
            report.bytes += bytes.len();
        }
        tracing::trace!(%origin, len = bytes.len(), "Message distributed");
    }

    if report.messages > 0 {
        tracing::debug!(
            messages = report.messages,
            deliveries = report.deliveries,
            bytes = report.bytes,
            "Broadcast distributed"
        );
        metrics::record_relayed(report.deliveries, report.bytes);
    }
    report
}
