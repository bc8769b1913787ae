//! Per-client connection with non-blocking buffering.
//!
//! # Responsibilities
//! - Read what the peer sent, one chunk per call, tagged with the peer's address
//! - Queue outbound bytes and flush them as the socket accepts them
//! - Track connection state (Open → Closed)
//!
//! A `Connection` never touches another connection. Bytes it reads sit in its
//! inbound buffer until the event loop moves them to the pending broadcast set.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::Token;

use crate::error::HandlerError;

/// Unique identifier for a connection.
///
/// Allocated by the registry from a monotonically increasing counter, so an
/// identifier (and the poll token derived from it) is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Poll token registered for this connection's socket.
    pub fn token(&self) -> Token {
        Token(self.0 as usize)
    }

    pub fn from_token(token: Token) -> Self {
        Self(token.0 as u64)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Reading and writing normally.
    Open,
    /// The peer half-closed its side; the connection is due to be closed.
    PeerClosed,
    /// Buffers released; nothing more will be read or written.
    Closed,
}

/// Result of a readable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were read and the socket may hold more. The poller will not
    /// report this socket again until new data arrives, so the caller must
    /// dispatch it again on its own.
    Partial,
    /// Nothing left to read until the next readiness edge.
    Drained,
    /// End of stream reached; the connection must be closed.
    PeerClosed,
}

/// Result of a writable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Socket buffer full; the remainder waits for the next writable event.
    Pending,
    /// Outbound queue is empty; write interest can be dropped.
    Drained,
}

/// Build the `"[host:port]: "` prefix used to tag relayed bytes.
pub fn sender_tag(addr: &SocketAddr) -> Vec<u8> {
    format!("[{}:{}]: ", addr.ip(), addr.port()).into_bytes()
}

/// One accepted client.
pub struct Connection<S> {
    id: ConnectionId,
    stream: S,
    peer_addr: SocketAddr,
    tag: Vec<u8>,
    /// Tagged bytes read during the current cycle.
    inbound: Vec<u8>,
    /// Bytes waiting to be written, oldest first.
    outbound: Vec<u8>,
    scratch: Box<[u8]>,
    created_at: Instant,
    state: ConnectionState,
    bytes_in: u64,
    bytes_out: u64,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(id: ConnectionId, stream: S, peer_addr: SocketAddr, read_chunk_size: usize) -> Self {
        Self {
            id,
            stream,
            peer_addr,
            tag: sender_tag(&peer_addr),
            inbound: Vec::new(),
            outbound: Vec::new(),
            scratch: vec![0u8; read_chunk_size.max(1)].into_boxed_slice(),
            created_at: Instant::now(),
            state: ConnectionState::Open,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Perform one non-blocking read of at most `read_chunk_size` bytes.
    ///
    /// The bytes are prefixed with the sender tag and appended to the inbound
    /// buffer. One call never reads more than one chunk, so a peer that keeps
    /// its socket full cannot hold the event loop. Growing the buffer uses
    /// `try_reserve`, so an allocation failure comes back as a fatal
    /// [`HandlerError::Exhausted`] instead of aborting inside the allocator.
    pub fn on_readable(&mut self) -> Result<ReadOutcome, HandlerError> {
        if self.state != ConnectionState::Open {
            return Ok(ReadOutcome::PeerClosed);
        }

        let n = loop {
            match self.stream.read(&mut self.scratch) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(ReadOutcome::Drained),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };

        if n == 0 {
            tracing::debug!(connection_id = %self.id, peer_addr = %self.peer_addr, "Peer closed connection");
            self.state = ConnectionState::PeerClosed;
            return Ok(ReadOutcome::PeerClosed);
        }

        self.inbound.try_reserve(self.tag.len() + n)?;
        self.inbound.extend_from_slice(&self.tag);
        self.inbound.extend_from_slice(&self.scratch[..n]);
        self.bytes_in += n as u64;
        tracing::trace!(connection_id = %self.id, len = n, "Read data from socket");
        Ok(ReadOutcome::Partial)
    }

    /// Flush as much of the outbound queue as the transport accepts.
    ///
    /// Whatever was written is removed from the front of the queue even when
    /// the call ends in an error, so the remainder is never duplicated.
    pub fn on_writable(&mut self) -> Result<WriteOutcome, HandlerError> {
        if self.state == ConnectionState::Closed {
            return Ok(WriteOutcome::Drained);
        }

        let mut written = 0;
        let result = loop {
            if written == self.outbound.len() {
                break Ok(WriteOutcome::Drained);
            }
            match self.stream.write(&self.outbound[written..]) {
                Ok(0) => break Err(io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => {
                    written += n;
                    tracing::trace!(
                        connection_id = %self.id,
                        len = n,
                        remaining = self.outbound.len() - written,
                        "Wrote to socket"
                    );
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(WriteOutcome::Pending),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(err.into()),
            }
        };

        self.outbound.drain(..written);
        self.bytes_out += written as u64;
        result
    }

    /// Append bytes to the outbound queue. Never blocks.
    pub fn enqueue_outbound(&mut self, bytes: &[u8]) {
        if self.state == ConnectionState::Closed || bytes.is_empty() {
            return;
        }
        self.outbound.extend_from_slice(bytes);
    }

    /// Record bytes as if this connection had sent them this cycle.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.inbound.extend_from_slice(&self.tag);
        self.inbound.extend_from_slice(bytes);
    }

    /// Take the bytes produced this cycle, leaving the inbound buffer empty.
    pub fn take_inbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.inbound)
    }

    /// Release buffers and mark the connection closed.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.inbound = Vec::new();
        self.outbound = Vec::new();
        tracing::debug!(
            connection_id = %self.id,
            peer_addr = %self.peer_addr,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            lifetime_secs = self.age().as_secs(),
            "Connection closed"
        );
        true
    }

    pub fn read_interest(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn write_interest(&self) -> bool {
        self.state != ConnectionState::Closed && !self.outbound.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn pending_outbound(&self) -> &[u8] {
        &self.outbound
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockStream, ReadStep};
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:5151".parse().unwrap()
    }

    fn connection(stream: MockStream) -> Connection<MockStream> {
        Connection::new(ConnectionId::new(7), stream, peer(), 4)
    }

    #[test]
    fn connection_id_maps_to_token() {
        let id = ConnectionId::new(42);
        assert_eq!(id.token(), Token(42));
        assert_eq!(ConnectionId::from_token(Token(42)), id);
        assert_eq!(id.to_string(), "conn-42");
    }

    #[test]
    fn tag_uses_host_and_port() {
        assert_eq!(sender_tag(&peer()), b"[10.0.0.7:5151]: ".to_vec());
    }

    #[test]
    fn each_read_is_one_tagged_chunk() {
        let mut conn = connection(MockStream::with_reads(vec![ReadStep::Data(b"hello\n".to_vec())]));

        // chunk size 4 splits the data over two reads
        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Partial);
        assert_eq!(conn.take_inbound(), b"[10.0.0.7:5151]: hell".to_vec());
        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Partial);
        assert_eq!(conn.take_inbound(), b"[10.0.0.7:5151]: o\n".to_vec());
        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Drained);
        assert!(conn.take_inbound().is_empty());
    }

    #[test]
    fn reads_in_one_cycle_concatenate() {
        let mut conn = connection(MockStream::with_reads(vec![
            ReadStep::Data(b"a".to_vec()),
            ReadStep::Data(b"b".to_vec()),
        ]));
        conn.on_readable().unwrap();
        conn.on_readable().unwrap();

        assert_eq!(conn.take_inbound(), b"[10.0.0.7:5151]: a[10.0.0.7:5151]: b".to_vec());
    }

    #[test]
    fn endless_stream_yields_after_one_chunk() {
        // a peer that never lets the socket run dry
        let reads = (0..1000).map(|_| ReadStep::Data(vec![b'z'; 64])).collect();
        let mut conn = connection(MockStream::with_reads(reads));

        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Partial);
        let inbound = conn.take_inbound();
        assert_eq!(inbound.len(), sender_tag(&peer()).len() + 4);
        assert_eq!(conn.stream_mut().reads.len(), 1000);
    }

    #[test]
    fn eof_keeps_data_read_before_it() {
        let mut conn = connection(MockStream::with_reads(vec![
            ReadStep::Data(b"bye".to_vec()),
            ReadStep::Eof,
        ]));

        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Partial);
        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::PeerClosed);
        assert_eq!(conn.state(), ConnectionState::PeerClosed);
        assert!(!conn.read_interest());
        assert_eq!(conn.take_inbound(), b"[10.0.0.7:5151]: bye".to_vec());
    }

    #[test]
    fn read_error_is_not_fatal() {
        let mut conn = connection(MockStream::with_reads(vec![ReadStep::Fail(ErrorKind::ConnectionReset)]));
        let err = conn.on_readable().unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn interrupted_read_is_retried() {
        let mut conn = connection(MockStream::with_reads(vec![
            ReadStep::Fail(ErrorKind::Interrupted),
            ReadStep::Data(b"x".to_vec()),
        ]));
        assert_eq!(conn.on_readable().unwrap(), ReadOutcome::Partial);
        assert_eq!(conn.take_inbound(), b"[10.0.0.7:5151]: x".to_vec());
    }

    #[test]
    fn write_interest_follows_queue() {
        let mut conn = connection(MockStream::new());
        assert!(!conn.write_interest());

        conn.enqueue_outbound(b"abc");
        assert!(conn.write_interest());

        assert_eq!(conn.on_writable().unwrap(), WriteOutcome::Drained);
        assert!(!conn.write_interest());
        assert_eq!(conn.stream_mut().written, b"abc".to_vec());
    }

    #[test]
    fn partial_write_preserves_remainder() {
        let mut stream = MockStream::new();
        stream.max_write = Some(3);
        stream.write_budget = Some(5);
        let mut conn = connection(stream);
        conn.enqueue_outbound(b"0123456789");

        assert_eq!(conn.on_writable().unwrap(), WriteOutcome::Pending);
        assert_eq!(conn.pending_outbound(), b"56789");
        assert_eq!(conn.stream_mut().written, b"01234".to_vec());

        conn.enqueue_outbound(b"AB");
        conn.stream_mut().write_budget = None;
        assert_eq!(conn.on_writable().unwrap(), WriteOutcome::Drained);
        assert_eq!(conn.stream_mut().written, b"0123456789AB".to_vec());
    }

    #[test]
    fn write_error_surfaces_and_keeps_queue() {
        let mut stream = MockStream::new();
        stream.write_error = Some(ErrorKind::BrokenPipe);
        let mut conn = connection(stream);
        conn.enqueue_outbound(b"data");

        assert!(conn.on_writable().is_err());
        assert_eq!(conn.pending_outbound(), b"data");
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = connection(MockStream::new());
        conn.enqueue_outbound(b"pending");

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.write_interest());

        conn.enqueue_outbound(b"late");
        assert!(conn.pending_outbound().is_empty());
    }
}
