//! Broadcast text-chat server library.
//!
//! Bytes received from one client are tagged with the sender's address and
//! relayed, one cycle later, to every other connected client. Everything runs
//! on a single thread driven by one readiness-polling loop.

pub mod cli;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::schema::ServerConfig;
pub use error::ServerError;
pub use event_loop::EventLoop;
pub use lifecycle::Shutdown;
