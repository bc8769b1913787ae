//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, count, swallow transient errors)
//!     → connection.rs (tagged reads, queued writes, state machine)
//!     → registered with the event loop
//!
//! Connection States:
//!     Open → PeerClosed → Closed
//!     Open → Closed (I/O error or shutdown)
//! ```
//!
//! # Design Decisions
//! - Every socket is non-blocking; handlers drain until `WouldBlock`
//! - A connection exclusively owns its socket and both buffers
//! - Connection ids are never reused, so a stale poll token cannot alias a
//!   newer client

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionId, ConnectionState, ReadOutcome, WriteOutcome};
pub use listener::{Accepted, Listener, ListenerError};
