//! Per-cycle set of messages awaiting fan-out.

use std::collections::BTreeMap;

use crate::net::connection::ConnectionId;

/// Bytes produced during one cycle, keyed by originating connection.
///
/// Several contributions from the same originator are concatenated in
/// insertion order.
#[derive(Debug, Default)]
pub struct PendingBroadcasts {
    entries: BTreeMap<ConnectionId, Vec<u8>>,
}

impl PendingBroadcasts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes produced by `origin` this cycle. Empty input is ignored.
    pub fn record(&mut self, origin: ConnectionId, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        match self.entries.get_mut(&origin) {
            Some(existing) => existing.extend_from_slice(&bytes),
            None => {
                self.entries.insert(origin, bytes);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &[u8])> {
        self.entries.iter().map(|(id, bytes)| (*id, bytes.as_slice()))
    }

    pub fn get(&self, origin: ConnectionId) -> Option<&[u8]> {
        self.entries.get(&origin).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
