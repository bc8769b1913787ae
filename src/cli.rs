//! Command-line interface of `chatserverd`.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{ServerConfig, DEFAULT_DAEMON_LOGFILE};
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "chatserverd")]
#[command(about = "Broadcast text-chat server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TCP port to listen on
    #[arg(long)]
    pub port: u16,

    /// Interface to bind (default: all interfaces)
    #[arg(long)]
    pub host: Option<String>,

    /// TOML configuration file; command-line flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Detach from the controlling terminal
    #[arg(long)]
    pub daemon: bool,

    /// PID file written after startup
    #[arg(long, value_name = "FILE")]
    pub pidfile: Option<PathBuf>,

    /// Append log lines to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub logfile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };

        config.listener.port = self.port;
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if self.daemon {
            config.process.daemonize = true;
        }
        if let Some(pidfile) = self.pidfile {
            config.process.pidfile = Some(pidfile);
        }
        if let Some(logfile) = self.logfile {
            config.process.logfile = Some(logfile);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if config.process.daemonize && config.process.logfile.is_none() {
            config.process.logfile = Some(PathBuf::from(DEFAULT_DAEMON_LOGFILE));
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
