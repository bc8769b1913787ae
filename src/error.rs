//! Top-level error types.

use std::collections::TryReserveError;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::lifecycle::startup::StartupError;
use crate::net::listener::ListenerError;

/// Errors that end the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("event loop I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable condition raised inside a connection handler.
    #[error("fatal handler error: {0}")]
    Fatal(HandlerError),
}

impl ServerError {
    /// Process exit status for this error.
    ///
    /// Configuration and bind problems use the usage status (2); everything
    /// else exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            ServerError::Config(_) | ServerError::Listener(_) => 2,
            _ => 1,
        }
    }
}

/// Error raised by a connection's read or write handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Socket-level failure; only the affected connection is closed.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound buffer could not grow.
    #[error("out of memory while buffering inbound data: {0}")]
    Exhausted(#[from] TryReserveError),
}

impl HandlerError {
    /// Fatal errors terminate the whole process instead of one connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Exhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_isolated() {
        let err = HandlerError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(!err.is_fatal());
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let mut buf: Vec<u8> = Vec::new();
        let reserve_err = buf.try_reserve(usize::MAX).unwrap_err();
        let err = HandlerError::from(reserve_err);
        assert!(err.is_fatal());
        assert_eq!(ServerError::Fatal(err).exit_code(), 1);
    }
}
