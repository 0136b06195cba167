//! Configuration file handling for Delivr

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the default config search
pub const CONFIG_ENV_VAR: &str = "DELIVR_CONFIG";

/// Name of the per-user directory under the home directory
pub const USER_DIR_NAME: &str = ".delivr";

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unable to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Discord webhook settings
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Full webhook URL (the key name is kept for compatibility with older files)
    #[serde(default)]
    pub channel_id: String,
}

/// Docker-specific settings
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Rotation settings for per-command log files
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Megabytes before a log file is rotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Days a rotated file is kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backups: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

/// A single command to run
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Extra `KEY=VALUE` pairs appended to the inherited environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<String>,
}

impl CommandSpec {
    /// The command line as it would be typed in a shell, for display only.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Root configuration structure for Delivr
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogConfig>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Returns true when the path should be read and written as YAML.
#[must_use]
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
}

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file does not exist,
    /// `ConfigError::Io` if it cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        if !file.exists() {
            return Err(ConfigError::ConfigNotFound(file.to_path_buf()));
        }
        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Io {
            path: file.to_path_buf(),
            source: e,
        })?;
        let config: Config = if is_yaml_file(file) {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(config)
    }

    /// Writes the configuration in the format implied by the file extension,
    /// creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the directory or file cannot be written,
    /// or a serialization error for the chosen format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = if is_yaml_file(path) {
            serde_yaml::to_string(self).map_err(|e| ConfigError::Yaml {
                source: e,
                path: path.to_path_buf(),
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Json {
                source: e,
                path: path.to_path_buf(),
            })?
        };

        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, data).map_err(io_err)
    }

    /// The example configuration written by `--init`.
    #[must_use]
    pub fn example() -> Config {
        Config {
            discord: DiscordConfig {
                channel_id: "YOUR_DISCORD_WEBHOOK_URL_HERE".to_string(),
            },
            docker: Some(DockerConfig {
                host: Some("unix:///var/run/docker.sock".to_string()),
            }),
            logs: Some(LogConfig {
                directory: Some(PathBuf::from("./logs")),
                max_size: Some(10),
                max_age: Some(30),
                max_backups: Some(5),
                compress: Some(true),
            }),
            commands: vec![
                CommandSpec {
                    name: "Show Docker Status".to_string(),
                    description: "Lists all running Docker containers".to_string(),
                    command: "docker".to_string(),
                    args: vec!["ps".to_string(), "-a".to_string()],
                    ..Default::default()
                },
                CommandSpec {
                    name: "Git Status".to_string(),
                    description: "Shows the working tree status".to_string(),
                    command: "git".to_string(),
                    args: vec!["status".to_string()],
                    ..Default::default()
                },
            ],
            working_dir: None,
        }
    }

    /// The configured Docker host, if any.
    #[must_use]
    pub fn docker_host(&self) -> Option<&str> {
        self.docker
            .as_ref()
            .and_then(|d| d.host.as_deref())
            .filter(|h| !h.is_empty())
    }
}

/// Write the example configuration to `path`.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be serialized or written.
pub fn create_default(path: &Path) -> Result<(), ConfigError> {
    Config::example().save(path)
}

/// Which search rule produced a config path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Passed with `--config`
    Explicit,
    /// Taken from `DELIVR_CONFIG`
    Environment,
    /// Hidden dotfile in the current directory
    Local,
    /// Old `config.yml`/`config.json` name in the current directory
    Legacy,
    /// Found under `~/.delivr`
    User,
    /// Nothing found; the fallback name
    Default,
}

/// A resolved config location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

const LOCAL_FILENAMES: [&str; 2] = [".delivr.yml", ".delivr.json"];
const LEGACY_FILENAMES: [&str; 2] = ["config.yml", "config.json"];
const USER_FILENAMES: [&str; 2] = ["config.yml", "config.json"];
const DEFAULT_FILENAME: &str = ".delivr.yml";

/// Inputs to config path resolution, separated from process state for testing
#[derive(Debug, Clone, Default)]
pub struct ConfigSearch {
    /// Directory searched for local and legacy file names
    pub cwd: PathBuf,
    /// Per-user directory (`~/.delivr`), if the home directory is known
    pub user_dir: Option<PathBuf>,
    /// Value of `DELIVR_CONFIG`
    pub env_path: Option<String>,
}

impl ConfigSearch {
    /// Capture the current directory, home directory and environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            cwd: PathBuf::new(),
            user_dir: user_dir(),
            env_path: std::env::var(CONFIG_ENV_VAR)
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }

    /// Pick the config file to load: explicit path, then the environment
    /// override, then the first existing conventional file name.
    #[must_use]
    pub fn resolve(&self, explicit: Option<&Path>) -> ConfigSource {
        if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
            return ConfigSource {
                path: path.to_path_buf(),
                origin: ConfigOrigin::Explicit,
            };
        }
        if let Some(env_path) = &self.env_path {
            return ConfigSource {
                path: PathBuf::from(env_path),
                origin: ConfigOrigin::Environment,
            };
        }

        debug!("Searching for config file in {}", self.display_cwd());
        let candidates = LOCAL_FILENAMES
            .iter()
            .map(|name| (self.cwd.join(name), ConfigOrigin::Local))
            .chain(
                LEGACY_FILENAMES
                    .iter()
                    .map(|name| (self.cwd.join(name), ConfigOrigin::Legacy)),
            )
            .chain(self.user_dir.iter().flat_map(|dir| {
                USER_FILENAMES
                    .iter()
                    .map(move |name| (dir.join(name), ConfigOrigin::User))
            }));

        for (path, origin) in candidates {
            if path.exists() {
                if origin == ConfigOrigin::Legacy {
                    warn!(
                        "Using deprecated config name '{}'. Consider renaming to '.delivr{}'",
                        path.display(),
                        if is_yaml_file(&path) { ".yml" } else { ".json" }
                    );
                }
                info!("Found config file: {}", path.display());
                return ConfigSource { path, origin };
            }
        }

        ConfigSource {
            path: self.cwd.join(DEFAULT_FILENAME),
            origin: ConfigOrigin::Default,
        }
    }

    fn display_cwd(&self) -> String {
        if self.cwd.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.cwd.display().to_string()
        }
    }
}

/// Resolve the config path against the real process environment.
#[must_use]
pub fn resolve_path(explicit: Option<&Path>) -> ConfigSource {
    ConfigSearch::from_env().resolve(explicit)
}

/// The per-user directory (`~/.delivr`), if the home directory can be determined.
#[must_use]
pub fn user_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(USER_DIR_NAME))
}
