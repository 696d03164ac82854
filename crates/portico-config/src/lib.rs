//! Configuration parsing for Portico
//!
//! This crate handles parsing and validation of portico.toml files and the
//! layering of global, project, environment and command-line settings into
//! one effective configuration.

pub mod merge;
pub mod toml;

// Re-export main types
pub use self::merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use self::toml::{parse_portico_toml, serialize_portico_toml, GateSection, PorticoToml};

use portico_core::error::PorticoError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, PorticoError>;

/// File name looked up in the project directory and its parents
pub const CONFIG_FILE_NAME: &str = "portico.toml";
