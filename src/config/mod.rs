//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (cli.rs)
//!     → ServerConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so a bare `--port` is a complete configuration
//! - Validation separates syntactic (serde) from semantic checks
//! - No reload: SIGHUP is recorded but does not re-read the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::EventLoopConfig;
pub use schema::GreetingConfig;
pub use schema::ListenerConfig;
pub use schema::ServerConfig;
