//! Registry of live connections, owned by the event loop.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use mio::Token;

use crate::net::connection::{Connection, ConnectionId};

/// Poll token of the listening socket. Connection ids start above it.
pub const LISTENER_TOKEN: Token = Token(0);

/// Live connections keyed by id.
///
/// Iteration is in ascending id order, i.e. accept order.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    connections: BTreeMap<ConnectionId, Connection<S>>,
    next_id: u64,
}

impl<S: Read + Write> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: LISTENER_TOKEN.0 as u64 + 1,
        }
    }

    /// Hand out the next identifier. Identifiers are never reused.
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, connection: Connection<S>) {
        self.connections.insert(connection.id(), connection);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<S>> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(&id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection<S>> {
        self.connections.remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection<S>> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<S>> {
        self.connections.values_mut()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<S: Read + Write> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
