//! Server counters.
//!
//! # Metrics
//! - `chat_accepted_connections_total` (counter): clients ever accepted
//! - `chat_active_connections` (gauge): live connections
//! - `chat_closed_connections_total` (counter): connections closed, by reason
//! - `chat_relayed_deliveries_total` (counter): (message, target) enqueues
//! - `chat_relayed_bytes_total` (counter): bytes enqueued for fan-out
//!
//! Updates go through the `metrics` facade. The binary installs no recorder,
//! so they cost nothing unless an embedding application installs one.
//! [`ServerStats`] keeps the same numbers locally for logs and tests.

/// Record one accepted client.
pub fn record_accepted() {
    metrics::counter!("chat_accepted_connections_total").increment(1);
}

/// Record the live connection count.
pub fn record_active(count: usize) {
    metrics::gauge!("chat_active_connections").set(count as f64);
}

/// Record a closed connection.
pub fn record_closed(reason: &'static str) {
    metrics::counter!("chat_closed_connections_total", "reason" => reason).increment(1);
}

/// Record a distribution pass.
pub fn record_relayed(deliveries: usize, bytes: usize) {
    metrics::counter!("chat_relayed_deliveries_total").increment(deliveries as u64);
    metrics::counter!("chat_relayed_bytes_total").increment(bytes as u64);
}

/// Snapshot of the event loop's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// Monotonic total of accepted clients.
    pub accepted_total: u64,
    pub active_connections: usize,
    pub cycles: u64,
    pub relayed_messages: u64,
    pub relayed_bytes: u64,
}
