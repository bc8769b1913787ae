//! Per-connection handler dispatch and error policy.
//!
//! These functions know nothing about the poller, so they work for any
//! stream type. The event loop applies the returned [`Disposition`] to its
//! registrations.

use std::io::{ErrorKind, Read, Write};

use crate::error::{HandlerError, ServerError};
use crate::net::connection::{Connection, ConnectionId, ReadOutcome, WriteOutcome};
use crate::relay::PendingBroadcasts;

/// What the loop must do with a connection after one of its handlers ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing to do until the next readiness event.
    Idle,
    /// Data may remain in the socket; dispatch a read again next cycle.
    ReadAgain,
    /// The outbound queue emptied; drop write interest.
    WriteDrained,
    /// Close the connection, for the given reason.
    Close(&'static str),
}

/// Run the read handler and move what it read into the pending set.
pub fn read_ready<S: Read + Write>(
    connection: &mut Connection<S>,
    pending: &mut PendingBroadcasts,
) -> Result<Disposition, ServerError> {
    let id = connection.id();
    tracing::trace!(connection_id = %id, peer_addr = %connection.peer_addr(), "Read event");

    let result = connection.on_readable();
    // bytes read before an EOF or error are still relayed
    pending.record(id, connection.take_inbound());

    settle(
        id,
        result.map(|outcome| match outcome {
            ReadOutcome::Partial => Disposition::ReadAgain,
            ReadOutcome::Drained => Disposition::Idle,
            ReadOutcome::PeerClosed => Disposition::Close("peer_closed"),
        }),
    )
}

/// Run the write handler.
pub fn write_ready<S: Read + Write>(connection: &mut Connection<S>) -> Result<Disposition, ServerError> {
    let id = connection.id();
    tracing::trace!(connection_id = %id, peer_addr = %connection.peer_addr(), "Write event");

    settle(
        id,
        connection.on_writable().map(|outcome| match outcome {
            WriteOutcome::Pending => Disposition::Idle,
            WriteOutcome::Drained => Disposition::WriteDrained,
        }),
    )
}

/// Isolate a handler failure to its connection, unless it is fatal.
pub fn settle(id: ConnectionId, result: Result<Disposition, HandlerError>) -> Result<Disposition, ServerError> {
    let err = match result {
        Ok(disposition) => return Ok(disposition),
        Err(err) => err,
    };

    if err.is_fatal() {
        tracing::error!(connection_id = %id, error = %err, "Fatal handler error");
        return Err(ServerError::Fatal(err));
    }

    match &err {
        HandlerError::Io(io) if matches!(io.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) => {
            tracing::warn!(connection_id = %id, error = %err, "Connection lost");
        }
        _ => {
            tracing::error!(connection_id = %id, error = %err, "Connection handler failed");
        }
    }
    Ok(Disposition::Close("error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::registry::ConnectionRegistry;
    use crate::net::connection::mock::{MockStream, ReadStep};

    fn registry_with(streams: Vec<MockStream>) -> ConnectionRegistry<MockStream> {
        let mut registry = ConnectionRegistry::new();
        for (i, stream) in streams.into_iter().enumerate() {
            let id = registry.allocate_id();
            let peer = format!("10.0.0.{}:4000", i + 1).parse().unwrap();
            registry.insert(Connection::new(id, stream, peer, 16));
        }
        registry
    }

    fn exhausted() -> HandlerError {
        let mut buf: Vec<u8> = Vec::new();
        HandlerError::from(buf.try_reserve(usize::MAX).unwrap_err())
    }

    #[test]
    fn partial_read_asks_for_another_dispatch() {
        let mut registry = registry_with(vec![MockStream::with_reads(vec![ReadStep::Data(vec![b'q'; 40])])]);
        let id = registry.ids()[0];
        let mut pending = PendingBroadcasts::new();

        let disposition = read_ready(registry.get_mut(id).unwrap(), &mut pending).unwrap();
        assert_eq!(disposition, Disposition::ReadAgain);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn eof_closes_but_keeps_final_bytes() {
        let mut registry = registry_with(vec![MockStream::with_reads(vec![ReadStep::Eof])]);
        let id = registry.ids()[0];
        registry.get_mut(id).unwrap().push_inbound(b"last words");
        let mut pending = PendingBroadcasts::new();

        let disposition = read_ready(registry.get_mut(id).unwrap(), &mut pending).unwrap();
        assert_eq!(disposition, Disposition::Close("peer_closed"));
        assert!(pending.get(id).is_some());
    }

    #[test]
    fn io_error_closes_only_its_connection() {
        let mut registry = registry_with(vec![
            MockStream::with_reads(vec![ReadStep::Fail(ErrorKind::ConnectionReset)]),
            MockStream::with_reads(vec![ReadStep::Data(b"fine".to_vec())]),
        ]);
        let ids = registry.ids();
        let mut pending = PendingBroadcasts::new();

        let first = read_ready(registry.get_mut(ids[0]).unwrap(), &mut pending).unwrap();
        let second = read_ready(registry.get_mut(ids[1]).unwrap(), &mut pending).unwrap();

        assert_eq!(first, Disposition::Close("error"));
        assert_eq!(second, Disposition::ReadAgain);
    }

    #[test]
    fn write_failure_closes_connection() {
        let mut stream = MockStream::new();
        stream.write_error = Some(ErrorKind::BrokenPipe);
        let mut registry = registry_with(vec![stream]);
        let id = registry.ids()[0];
        let connection = registry.get_mut(id).unwrap();
        connection.enqueue_outbound(b"lost");

        assert_eq!(write_ready(connection).unwrap(), Disposition::Close("error"));
    }

    #[test]
    fn drained_queue_drops_write_interest() {
        let mut registry = registry_with(vec![MockStream::new()]);
        let id = registry.ids()[0];
        let connection = registry.get_mut(id).unwrap();
        connection.enqueue_outbound(b"hello");

        assert_eq!(write_ready(connection).unwrap(), Disposition::WriteDrained);
    }

    #[test]
    fn exhaustion_is_fatal() {
        let err = settle(ConnectionId::new(3), Err(exhausted())).unwrap_err();
        assert!(matches!(err, ServerError::Fatal(HandlerError::Exhausted(_))));
    }
}
