//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Install signals → Daemonize → PID file → Run loop
//!
//! Signals (signals.rs):
//!     OS signal → handler records number in SignalQueue (atomics only)
//!
//! Shutdown (shutdown.rs):
//!     Loop drains one signal per cycle → SIGTERM: Running → ShuttingDown
//!     → next cycle halts → connections and listener closed → PID file removed
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then the socket, then detaching
//! - In-flight work of the current cycle always completes before shutdown
//! - SIGINT, SIGQUIT, SIGHUP, SIGCHLD, SIGUSR2 are recorded but change nothing

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{LifecycleController, ServerState, Shutdown};
pub use signals::SignalQueue;
