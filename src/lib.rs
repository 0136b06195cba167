//! Core implementation of Delivr
//!
//! Delivr runs a list of commands from a configuration file one after the
//! other, keeps a rotating log file per command and posts a start and result
//! message for each command to a Discord webhook. The binary can exit once
//! the list is done or stay resident until it receives SIGINT/SIGTERM.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config_file::{Config, ConfigError, ConfigOrigin, ConfigSearch};

pub mod command_log;
pub mod config_file;
pub mod daemon;
pub mod logger;
pub mod notifier;
pub mod runner;

/// A parsed configuration and the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

/// Load configuration from an explicit file or the default search locations.
///
/// # Errors
///
/// Returns `ConfigError` if the config file is not found, cannot be parsed,
/// or contains invalid values.
pub fn load_config(config_file: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_with(&ConfigSearch::from_env(), config_file)
}

/// Like [`load_config`], resolving default locations with `search`.
///
/// # Errors
///
/// Returns `ConfigError` if the config file is not found, cannot be parsed,
/// or contains invalid values.
pub fn load_config_with(
    search: &ConfigSearch,
    config_file: Option<&Path>,
) -> Result<LoadedConfig, ConfigError> {
    let source = search.resolve(config_file);
    debug!(
        "Loading config file: {} ({:?})",
        source.path.display(),
        source.origin
    );
    let config = Config::from_file(&source.path)?;
    validate(&config)?;
    Ok(LoadedConfig {
        config,
        path: source.path,
        origin: source.origin,
    })
}

/// Check every command has a name and an executable
fn validate(config: &Config) -> Result<(), ConfigError> {
    for (i, cmd) in config.commands.iter().enumerate() {
        if cmd.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Command #{} has an empty name",
                i + 1
            )));
        }
        if cmd.command.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Command '{}' has an empty command",
                cmd.name
            )));
        }
    }
    Ok(())
}
