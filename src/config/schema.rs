//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the chat
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the chat server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Event loop tuning.
    pub event_loop: EventLoopConfig,

    /// What newly accepted clients see and announce.
    pub greeting: GreetingConfig,

    /// Daemonization, PID file and log file.
    pub process: ProcessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind. Empty means all interfaces.
    pub host: String,

    /// TCP port. 0 asks the OS for an ephemeral port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 9001,
        }
    }
}

impl ListenerConfig {
    /// `host:port` string suitable for address resolution.
    pub fn bind_address(&self) -> String {
        let host = if self.host.is_empty() { "0.0.0.0" } else { self.host.as_str() };
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Poll timeout in milliseconds. Bounds how long a shutdown request or a
    /// pending broadcast can wait with no I/O activity.
    pub poll_timeout_ms: u64,

    /// Bytes requested per `read` call.
    pub read_chunk_size: usize,

    /// Capacity of the readiness event buffer.
    pub events_capacity: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            read_chunk_size: 4096,
            events_capacity: 1024,
        }
    }
}

impl EventLoopConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// On-connect behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GreetingConfig {
    /// Banner sent only to the new client, untagged.
    pub banner: Option<String>,

    /// Relay a tagged join line to everyone else.
    pub announce_join: bool,

    /// Text of the join line.
    pub join_message: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            banner: None,
            announce_join: false,
            join_message: "I'm online now!!!\n".to_string(),
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Detach from the controlling terminal before running the loop.
    pub daemonize: bool,

    /// PID file path. `None` disables the PID file.
    pub pidfile: Option<PathBuf>,

    /// Append-only log file. `None` logs to stderr.
    pub logfile: Option<PathBuf>,

    /// File mode creation mask applied by the daemonized child.
    pub umask: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            daemonize: false,
            pidfile: Some(PathBuf::from("/tmp/chatserver.pid")),
            logfile: None,
            umask: 0o022,
        }
    }
}

/// Default log file used when daemonized without an explicit one.
pub const DEFAULT_DAEMON_LOGFILE: &str = "/tmp/chatserver.log";

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
