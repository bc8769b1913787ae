//! Non-blocking TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address (backlog 1024, address reuse)
//! - Accept incoming TCP connections one at a time
//! - Swallow and log transient accept errors
//! - Count every client ever accepted

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};

use mio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::observability::metrics;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured host did not resolve to any address.
    Resolve(String, std::io::Error),
    /// Failed to bind to address.
    Bind(SocketAddr, std::io::Error),
}

impl ListenerError {
    /// True when another process already owns the port.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, ListenerError::Bind(_, e) if e.kind() == ErrorKind::AddrInUse)
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve(addr, e) => write!(f, "Cannot resolve {}: {}", addr, e),
            ListenerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A freshly accepted client socket.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
}

/// Outcome of a single accept attempt.
#[derive(Debug)]
pub enum AcceptStep {
    Accepted(Accepted),
    /// Backlog empty (would block).
    Empty,
    /// Transient failure; the backlog may still hold clients.
    Skipped,
    /// Persistent failure; stop accepting until the next readable event.
    Failed,
}

/// The listening socket of the chat server.
pub struct Listener {
    /// `None` once closed; dropping the socket releases the port.
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    accepted_total: u64,
}

impl Listener {
    /// Bind to the configured address.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let requested = config.bind_address();
        let addr = requested
            .to_socket_addrs()
            .map_err(|e| ListenerError::Resolve(requested.clone(), e))?
            .next()
            .ok_or_else(|| {
                ListenerError::Resolve(
                    requested.clone(),
                    std::io::Error::new(ErrorKind::NotFound, "no addresses returned"),
                )
            })?;

        // mio sets SO_REUSEADDR and listens with a backlog of 1024
        let inner = TcpListener::bind(addr).map_err(|e| ListenerError::Bind(addr, e))?;
        let local_addr = inner.local_addr().map_err(|e| ListenerError::Bind(addr, e))?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self {
            inner: Some(inner),
            local_addr,
            accepted_total: 0,
        })
    }

    /// Accept exactly one pending connection.
    pub fn accept_one(&mut self) -> AcceptStep {
        let Some(inner) = self.inner.as_ref() else {
            return AcceptStep::Empty;
        };
        match inner.accept() {
            Ok((stream, peer_addr)) => {
                self.accepted_total += 1;
                metrics::record_accepted();
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::debug!(%peer_addr, ?err, "Could not set TCP_NODELAY");
                }
                tracing::info!(
                    %peer_addr,
                    accepted_total = self.accepted_total,
                    "Connection accepted"
                );
                AcceptStep::Accepted(Accepted { stream, peer_addr })
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => AcceptStep::Empty,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
                ) =>
            {
                tracing::warn!(?err, local_addr = %self.local_addr, "Transient accept error");
                AcceptStep::Skipped
            }
            Err(err) => {
                tracing::error!(?err, local_addr = %self.local_addr, "Error accepting connection");
                AcceptStep::Failed
            }
        }
    }

    /// Drain the accept backlog.
    ///
    /// The poller is edge-triggered, so one readable event must empty the
    /// backlog by invoking [`Listener::accept_one`] until it reports nothing
    /// pending.
    pub fn on_readable(&mut self) -> Vec<Accepted> {
        let mut accepted = Vec::new();
        loop {
            match self.accept_one() {
                AcceptStep::Accepted(client) => accepted.push(client),
                AcceptStep::Skipped => continue,
                AcceptStep::Empty | AcceptStep::Failed => break,
            }
        }
        if accepted.is_empty() {
            tracing::debug!(local_addr = %self.local_addr, "Spurious accept wakeup");
        }
        accepted
    }

    /// Total clients accepted since bind. Never decreases.
    pub fn accepted_total(&self) -> u64 {
        self.accepted_total
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn read_interest(&self) -> bool {
        self.is_open()
    }

    pub fn write_interest(&self) -> bool {
        false
    }

    /// Close the listening socket. Returns `false` if already closed.
    ///
    /// Deregister it from the poller first.
    pub fn close(&mut self) -> bool {
        if self.inner.take().is_none() {
            return false;
        }
        tracing::info!(
            local_addr = %self.local_addr,
            accepted_total = self.accepted_total,
            "Listener closed"
        );
        true
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut TcpListener> {
        self.inner.as_mut()
    }
}
