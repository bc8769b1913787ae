//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and combinations.
//! Every problem is reported, not just the first one.

use std::fmt;
use tracing::level_filters::LevelFilter;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.event_loop.poll_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "event_loop.poll_timeout_ms",
            "must be greater than zero",
        ));
    }
    if config.event_loop.read_chunk_size == 0 {
        errors.push(ValidationError::new(
            "event_loop.read_chunk_size",
            "must be greater than zero",
        ));
    }
    if config.event_loop.events_capacity == 0 {
        errors.push(ValidationError::new(
            "event_loop.events_capacity",
            "must be greater than zero",
        ));
    }
    if config.greeting.announce_join && config.greeting.join_message.is_empty() {
        errors.push(ValidationError::new(
            "greeting.join_message",
            "must not be empty when announce_join is set",
        ));
    }
    if config.process.umask > 0o777 {
        errors.push(ValidationError::new(
            "process.umask",
            format!("{:o} is not a valid permission mask", config.process.umask),
        ));
    }
    if config.observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unrecognised level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn reports_all_errors() {
        let mut config = ServerConfig::default();
        config.event_loop.poll_timeout_ms = 0;
        config.event_loop.read_chunk_size = 0;
        config.process.umask = 0o1777;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "event_loop.poll_timeout_ms",
                "event_loop.read_chunk_size",
                "process.umask",
            ]
        );
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = ServerConfig::default();
        config.observability.log_level = "chatty".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.log_level");
    }

    #[test]
    fn announce_requires_message() {
        let mut config = ServerConfig::default();
        config.greeting.announce_join = true;
        config.greeting.join_message.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "greeting.join_message");
    }
}
