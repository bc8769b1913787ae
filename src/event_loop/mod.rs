//! Single-threaded readiness event loop.
//!
//! # Cycle
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ 1. relay::distribute (messages read during the previous cycle)     │
//! │ 2. clear PendingBroadcasts                                         │
//! │ 3. state != Running?  → Stopped, leave the loop                    │
//! │ 4. recompute interest (reregister connections whose interest moved)│
//! │ 5. Poll::poll(timeout)  → ready-read tokens, ready-write tokens    │
//! │ 6. on_readable for each ready-read token still registered,         │
//! │    plus connections whose last read may have left data behind      │
//! │ 7. on_writable for each ready-write token still registered         │
//! │ 8. handle at most one pending signal                               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - The poll is the only place the loop suspends; every handler runs to
//!   completion without blocking
//! - A handler error closes only its own connection, except allocation
//!   failure, which ends the process
//! - The poll timeout bounds how long a shutdown request waits when no
//!   socket is active
//! - A read handler performs one read. A connection whose read returned data
//!   chunk is dispatched again next cycle without a new readiness edge, and
//!   the poll does not block while any such connection is waiting

pub mod dispatch;
pub mod registry;

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use crate::config::{GreetingConfig, ServerConfig};
use crate::error::ServerError;
use crate::lifecycle::{LifecycleController, ServerState, SignalQueue};
use crate::net::connection::{Connection, ConnectionId};
use crate::net::listener::Listener;
use crate::observability::metrics::{self, ServerStats};
use crate::relay::{self, PendingBroadcasts};

use dispatch::Disposition;
use registry::{ConnectionRegistry, LISTENER_TOKEN};

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    /// The loop observed a shutdown request and stopped.
    Halted,
}

/// The chat server's central scheduler.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: Listener,
    registry: ConnectionRegistry<TcpStream>,
    /// Interest currently registered with the poller, per connection.
    registered: HashMap<ConnectionId, Interest>,
    /// Connections to read again next cycle even without a readiness event.
    still_readable: BTreeSet<ConnectionId>,
    pending: PendingBroadcasts,
    lifecycle: LifecycleController,
    greeting: GreetingConfig,
    poll_timeout: Duration,
    read_chunk_size: usize,
    stats: ServerStats,
    #[cfg(test)]
    hooks: TestHooks,
}

/// Failure injection for exercising error paths that real sockets rarely hit.
#[cfg(test)]
#[derive(Default)]
struct TestHooks {
    read_failures: HashMap<ConnectionId, crate::error::HandlerError>,
    reject_registration: bool,
}

impl EventLoop {
    /// Create the poller and register the listening socket.
    pub fn new(
        config: &ServerConfig,
        mut listener: Listener,
        signals: Arc<SignalQueue>,
    ) -> Result<Self, ServerError> {
        let poll = Poll::new()?;
        if let Some(source) = listener.source_mut() {
            poll.registry().register(source, LISTENER_TOKEN, Interest::READABLE)?;
        }

        Ok(Self {
            poll,
            events: Events::with_capacity(config.event_loop.events_capacity),
            listener,
            registry: ConnectionRegistry::new(),
            registered: HashMap::new(),
            still_readable: BTreeSet::new(),
            pending: PendingBroadcasts::new(),
            lifecycle: LifecycleController::new(signals),
            greeting: config.greeting.clone(),
            poll_timeout: config.event_loop.poll_timeout(),
            read_chunk_size: config.event_loop.read_chunk_size,
            stats: ServerStats::default(),
            #[cfg(test)]
            hooks: TestHooks::default(),
        })
    }

    /// Run cycles until shutdown, then close every connection and the
    /// listener.
    pub fn run(&mut self) -> Result<(), ServerError> {
        tracing::info!(
            address = %self.listener.local_addr(),
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "Event loop started"
        );

        let result = loop {
            match self.run_cycle() {
                Ok(CycleOutcome::Continue) => continue,
                Ok(CycleOutcome::Halted) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        self.shutdown();
        tracing::info!(
            cycles = self.stats.cycles,
            accepted_total = self.listener.accepted_total(),
            "Event loop stopped"
        );
        result
    }

    /// Execute one cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, ServerError> {
        let report = relay::distribute(&self.pending, &mut self.registry);
        self.pending.clear();
        self.stats.relayed_messages += report.messages as u64;
        self.stats.relayed_bytes += report.bytes as u64;

        if !self.lifecycle.is_running() {
            self.lifecycle.mark_stopped();
            return Ok(CycleOutcome::Halted);
        }
        self.stats.cycles += 1;

        self.update_interests();

        let timeout = if self.still_readable.is_empty() {
            self.poll_timeout
        } else {
            Duration::ZERO
        };
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            // a signal landed while blocked; it is picked up in step 8
            Err(err) if err.kind() == ErrorKind::Interrupted => self.events.clear(),
            Err(err) => return Err(err.into()),
        }

        let mut accept = false;
        let mut ready_read = std::mem::take(&mut self.still_readable);
        let mut ready_write: Vec<Token> = Vec::new();
        for event in self.events.iter() {
            if event.is_readable() || event.is_read_closed() || event.is_error() {
                if event.token() == LISTENER_TOKEN {
                    accept = true;
                } else {
                    ready_read.insert(ConnectionId::from_token(event.token()));
                }
            }
            if event.is_writable() || event.is_write_closed() {
                ready_write.push(event.token());
            }
        }

        if accept {
            self.accept_clients();
        }
        for id in ready_read {
            self.dispatch_read(id)?;
        }

        for token in ready_write {
            if token != LISTENER_TOKEN {
                self.dispatch_write(ConnectionId::from_token(token))?;
            }
        }

        self.lifecycle.handle_pending_signal();
        Ok(CycleOutcome::Continue)
    }

    /// Running → ShuttingDown. Takes effect at the top of the next cycle.
    pub fn request_shutdown(&mut self) -> bool {
        self.lifecycle.request_shutdown()
    }

    /// Close every connection and the listener. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        for id in self.registry.ids() {
            self.close_connection(id, "shutdown");
        }
        if let Some(source) = self.listener.source_mut() {
            if let Err(err) = self.poll.registry().deregister(source) {
                tracing::debug!(?err, "Failed to deregister listener");
            }
        }
        self.listener.close();
        self.pending.clear();
        self.still_readable.clear();
    }

    /// Force-close one connection. Unknown or already closed ids are a no-op.
    pub fn close_connection(&mut self, id: ConnectionId, reason: &'static str) -> bool {
        let Some(mut connection) = self.registry.remove(id) else {
            return false;
        };
        self.registered.remove(&id);
        self.still_readable.remove(&id);
        if let Err(err) = self.poll.registry().deregister(connection.stream_mut()) {
            tracing::debug!(connection_id = %id, ?err, "Failed to deregister connection");
        }
        connection.close();
        metrics::record_closed(reason);
        metrics::record_active(self.registry.len());
        tracing::info!(
            connection_id = %id,
            peer_addr = %connection.peer_addr(),
            reason,
            "Connection closed"
        );
        true
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accepted_total: self.listener.accepted_total(),
            active_connections: self.registry.len(),
            ..self.stats
        }
    }

    fn desired_interest(connection: &Connection<TcpStream>) -> Interest {
        if connection.write_interest() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    fn update_interests(&mut self) {
        let mut failed = Vec::new();
        for connection in self.registry.iter_mut() {
            let id = connection.id();
            let desired = Self::desired_interest(connection);
            if self.registered.get(&id) == Some(&desired) {
                continue;
            }
            match self
                .poll
                .registry()
                .reregister(connection.stream_mut(), id.token(), desired)
            {
                Ok(()) => {
                    self.registered.insert(id, desired);
                }
                Err(err) => {
                    tracing::warn!(connection_id = %id, ?err, "Failed to update interest");
                    failed.push(id);
                }
            }
        }
        for id in failed {
            self.close_connection(id, "error");
        }
    }

    fn accept_clients(&mut self) {
        for accepted in self.listener.on_readable() {
            let id = self.registry.allocate_id();
            let mut connection =
                Connection::new(id, accepted.stream, accepted.peer_addr, self.read_chunk_size);

            if let Some(banner) = &self.greeting.banner {
                connection.enqueue_outbound(banner.as_bytes());
            }

            let interest = Self::desired_interest(&connection);
            if let Err(err) = self.register(&mut connection, interest) {
                tracing::error!(connection_id = %id, ?err, "Failed to register connection");
                continue;
            }
            tracing::debug!(connection_id = %id, peer_addr = %connection.peer_addr(), "Connection registered");
            self.registered.insert(id, interest);

            // only clients that actually joined are announced
            if self.greeting.announce_join {
                connection.push_inbound(self.greeting.join_message.as_bytes());
                self.pending.record(id, connection.take_inbound());
            }
            self.registry.insert(connection);
        }
        metrics::record_active(self.registry.len());
    }

    fn register(&mut self, connection: &mut Connection<TcpStream>, interest: Interest) -> std::io::Result<()> {
        #[cfg(test)]
        if self.hooks.reject_registration {
            return Err(ErrorKind::OutOfMemory.into());
        }
        let token = connection.id().token();
        self.poll
            .registry()
            .register(connection.stream_mut(), token, interest)
    }

    fn dispatch_read(&mut self, id: ConnectionId) -> Result<(), ServerError> {
        #[cfg(test)]
        if let Some(err) = self.hooks.read_failures.remove(&id) {
            let disposition = dispatch::settle(id, Err(err))?;
            self.apply(id, disposition);
            return Ok(());
        }

        let Some(connection) = self.registry.get_mut(id) else {
            return Ok(());
        };
        let disposition = dispatch::read_ready(connection, &mut self.pending)?;
        self.apply(id, disposition);
        Ok(())
    }

    fn dispatch_write(&mut self, id: ConnectionId) -> Result<(), ServerError> {
        let Some(connection) = self.registry.get_mut(id) else {
            return Ok(());
        };
        let disposition = dispatch::write_ready(connection)?;
        self.apply(id, disposition);
        Ok(())
    }

    fn apply(&mut self, id: ConnectionId, disposition: Disposition) {
        match disposition {
            Disposition::Idle => {}
            Disposition::ReadAgain => {
                self.still_readable.insert(id);
            }
            Disposition::WriteDrained => self.drop_write_interest(id),
            Disposition::Close(reason) => {
                self.close_connection(id, reason);
            }
        }
    }

    /// An empty queue drops write interest right away, so bytes enqueued later
    /// produce a fresh writable edge.
    fn drop_write_interest(&mut self, id: ConnectionId) {
        if self.registered.get(&id) == Some(&Interest::READABLE) {
            return;
        }
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        match self
            .poll
            .registry()
            .reregister(connection.stream_mut(), id.token(), Interest::READABLE)
        {
            Ok(()) => {
                self.registered.insert(id, Interest::READABLE);
            }
            Err(err) => {
                tracing::warn!(connection_id = %id, ?err, "Failed to drop write interest");
                self.close_connection(id, "error");
            }
        }
    }
}
