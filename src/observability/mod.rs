//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, stderr or log file)
//!     → metrics.rs (counters and gauges through the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`peer_addr`, `connection_id`) instead of formatted text
//! - Per-event dispatch logs are trace level; lifecycle events are info
//! - Counters are plain integers owned by the single loop thread

pub mod logging;
pub mod metrics;

pub use metrics::ServerStats;
