//! Tether Configuration System
//!
//! Provides configuration for embedding the tether runtime bridge:
//! - Runtime settings (`[runtime]` table of `tether.toml`)
//! - Environment variable overrides (`TETHER_*`)
//! - Validation of limits
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Project config (`./tether.toml`, searched upwards)
//! 3. Environment variables (`TETHER_*`)
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! assert!(config.runtime.max_call_depth > 0);
//! ```

pub mod loader;
pub mod runtime;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "tether.toml";

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use runtime::{ProjectConfig, RuntimeConfig};
