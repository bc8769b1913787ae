//! Broadcast chat server daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    chatserverd                       │
//!                 │                                                      │
//!   TCP clients   │  ┌──────────┐    ┌─────────────┐    ┌────────────┐   │
//!   ──────────────┼─▶│ listener │───▶│ connections │───▶│  pending   │   │
//!                 │  │ (accept) │    │ (read/tag)  │    │ broadcasts │   │
//!                 │  └──────────┘    └─────────────┘    └─────┬──────┘   │
//!                 │                         ▲                  │ next     │
//!   ◀─────────────┼─────────────────────────┘                  │ cycle    │
//!     relayed     │        on_writable            relay::distribute       │
//!     bytes       │                                                      │
//!                 │  ┌────────────────────────────────────────────────┐  │
//!                 │  │ event_loop: one thread, mio poll, 8-step cycle │  │
//!                 │  │ lifecycle: signals → Running → ShuttingDown    │  │
//!                 │  └────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use chat_server::cli::Cli;
use chat_server::config::ServerConfig;
use chat_server::error::ServerError;
use chat_server::event_loop::EventLoop;
use chat_server::lifecycle::signals;
use chat_server::lifecycle::startup::{daemonize, Forked, PidFile};
use chat_server::lifecycle::SignalQueue;
use chat_server::net::Listener;
use chat_server::observability::logging::{init_logging, open_log_file};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How `run` ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The event loop ran and stopped.
    Stopped,
    /// This is the parent of a daemonized server; the child carries on.
    Detached,
}

impl Outcome {
    /// Log line for a clean exit. The detached parent shares the daemon's log
    /// file, so it writes nothing.
    fn exit_note(self) -> Option<&'static str> {
        match self {
            Outcome::Stopped => Some("Shutdown complete"),
            Outcome::Detached => None,
        }
    }
}

fn usage(message: &str) {
    let progname = std::env::args().next().unwrap_or_else(|| "chatserverd".into());
    eprintln!("Error: {}", message);
    eprintln!("Please use {} --port=<port>", progname);
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            usage(&err.to_string());
            return ExitCode::from(2);
        }
    };

    let log_file = match &config.process.logfile {
        Some(path) => match open_log_file(path) {
            Ok(file) => Some(file),
            Err(err) => {
                usage(&format!("cannot open log file {}: {}", path.display(), err));
                return ExitCode::from(2);
            }
        },
        None => None,
    };
    init_logging(&config.observability, log_file);

    match run(config) {
        Ok(outcome) => {
            if let Some(note) = outcome.exit_note() {
                tracing::info!("{}", note);
            }
            ExitCode::SUCCESS
        }
        Err(ServerError::Fatal(err)) => {
            tracing::error!(error = %err, "Terminating");
            eprintln!("Out of Memory!");
            ExitCode::from(1)
        }
        Err(ServerError::Listener(err)) => {
            tracing::error!(error = %err, "Cannot open the chat server socket");
            if err.is_addr_in_use() {
                usage(
                    "Another program is already listening on a port that our chat server \
                     is configured to use. Shut this program down first before starting \
                     chat server.",
                );
            } else {
                usage(&format!("Cannot open a chat server: {}", err));
            }
            ExitCode::from(2)
        }
        Err(err) => {
            tracing::error!(error = %err, "Chat server failed");
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(config: ServerConfig) -> Result<Outcome, ServerError> {
    let listener = Listener::bind(&config.listener)?;
    let local_addr = listener.local_addr();
    tracing::info!(
        version = VERSION,
        address = %local_addr,
        "Chat Server started"
    );
    println!("Chat Server is listening on port {}", local_addr.port());

    let signal_queue = Arc::new(SignalQueue::new());
    let _signal_guard = signals::install(&signal_queue)?;

    if config.process.daemonize {
        if daemonize(config.process.umask)? == Forked::Parent {
            println!("Chat server is daemonized");
            return Ok(Outcome::Detached);
        }
        tracing::info!(pid = std::process::id(), "Detached from terminal");
    }

    let _pidfile = match config.process.pidfile.as_deref() {
        Some(path) => match PidFile::write(path) {
            Ok(pidfile) => Some(pidfile),
            Err(err) => {
                tracing::warn!(error = %err, "Continuing without pidfile");
                None
            }
        },
        None => None,
    };

    let mut event_loop = EventLoop::new(&config, listener, signal_queue)?;
    event_loop.run()?;
    Ok(Outcome::Stopped)
}
