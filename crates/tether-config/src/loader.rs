//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::runtime::{ProjectConfig, RuntimeConfig};
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Project config (./tether.toml) - overrides defaults
/// 3. Environment variables (TETHER_*) - overrides project
pub struct ConfigLoader {
    /// Name of the file searched for
    file_name: String,
}

/// Merged configuration result
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Effective runtime configuration
    pub runtime: RuntimeConfig,

    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            file_name: CONFIG_FILE_NAME.to_string(),
        }
    }

    /// Search for a differently named configuration file
    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find tether.toml. Missing files are not
    /// an error; defaults apply.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (source, project) = self.find_project_config(start_dir)?;
        let runtime = apply_env_overrides(project.runtime)?;
        Ok(Config { runtime, source })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let runtime = apply_env_overrides(project.runtime)?;
        Ok(Config {
            runtime,
            source: Some(config_path.to_path_buf()),
        })
    }

    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(&self.file_name);

            if config_path.exists() {
                let project = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(config_path), project));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => {
                    tracing::debug!(
                        start = %start_dir.display(),
                        "no {} found, using defaults",
                        self.file_name
                    );
                    return Ok((None, ProjectConfig::default()));
                }
            }
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides to runtime config
///
/// Recognized variables: TETHER_CHECK_ARGUMENTS, TETHER_MAX_CALL_DEPTH,
/// TETHER_MAX_STACK_SLOTS.
pub fn apply_env_overrides(mut config: RuntimeConfig) -> ConfigResult<RuntimeConfig> {
    if let Ok(check) = env::var("TETHER_CHECK_ARGUMENTS") {
        config.check_arguments = matches!(check.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(depth) = env::var("TETHER_MAX_CALL_DEPTH") {
        config.max_call_depth = parse_limit("TETHER_MAX_CALL_DEPTH", &depth)?;
    }

    if let Ok(slots) = env::var("TETHER_MAX_STACK_SLOTS") {
        config.max_stack_slots = parse_limit("TETHER_MAX_STACK_SLOTS", &slots)?;
    }

    config.validate()?;
    Ok(config)
}

fn parse_limit(field: &str, raw: &str) -> ConfigResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid count: {}", raw, e),
        })
}
