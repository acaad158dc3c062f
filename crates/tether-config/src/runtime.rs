//! Runtime configuration (`[runtime]` table of tether.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default limit on nested native calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Default limit on live stack slots per runtime instance
pub const DEFAULT_MAX_STACK_SLOTS: usize = 1_000_000;

/// Project configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Settings applied to every runtime instance created with them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Verify that values wrapped as protected functions are callable
    pub check_arguments: bool,

    /// Maximum depth of nested native calls before a stack overflow error
    pub max_call_depth: usize,

    /// Maximum number of live stack slots before a memory error
    pub max_stack_slots: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            check_arguments: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_slots: DEFAULT_MAX_STACK_SLOTS,
        }
    }
}

impl RuntimeConfig {
    /// Strict configuration: argument checking enabled, default limits
    pub fn strict() -> Self {
        Self {
            check_arguments: true,
            ..Self::default()
        }
    }

    /// Validate limits
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.max_call_depth".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_stack_slots == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.max_stack_slots".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.runtime.validate()?;
        tracing::debug!(path = %path.display(), "loaded project configuration");
        Ok(config)
    }
}
