//! Per-command log files
//!
//! Each command writes to `<directory>/<sanitized-name>-<YYYY-MM-DD>.log`.
//! Writers are cached by sanitized name, so several runs of the same command
//! on the same day append to one file.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config_file::{LogConfig, user_dir};

pub mod rotate;

use rotate::RotationPolicy;

pub const DEFAULT_MAX_SIZE_MB: u64 = 10;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;
pub const DEFAULT_MAX_BACKUPS: usize = 5;

const FORBIDDEN_CHARS: [char; 10] = [' ', '/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to get home directory")]
    NoHomeDirectory,
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A cloneable, thread-safe handle to a log writer.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<dyn Write + Send>>);

impl SharedWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl std::fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedWriter")
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

/// Where command output is recorded.
pub trait LogSink {
    /// Writer for the named command, opened on first use.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the log file cannot be opened.
    fn writer_for(&mut self, command_name: &str) -> io::Result<SharedWriter>;

    /// The file the named command logs to, without opening it.
    fn path_for(&self, command_name: &str) -> PathBuf;
}

/// Turn a command name into a token safe to use in a file name.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// Log settings with every default filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLogConfig {
    pub directory: PathBuf,
    pub policy: RotationPolicy,
}

impl ResolvedLogConfig {
    /// Fill unset (or zero) values with the defaults.
    ///
    /// # Errors
    ///
    /// Returns `LogError::NoHomeDirectory` if no directory is configured and
    /// the home directory cannot be determined.
    pub fn resolve(config: &LogConfig) -> Result<Self, LogError> {
        let directory = match config.directory.clone().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => user_dir().ok_or(LogError::NoHomeDirectory)?.join("logs"),
        };
        let max_size = config
            .max_size
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_SIZE_MB);
        let max_age = config
            .max_age
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_AGE_DAYS);
        let max_backups = config
            .max_backups
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_BACKUPS);
        Ok(Self {
            directory,
            policy: RotationPolicy::new(
                max_size,
                max_age,
                max_backups,
                config.compress.unwrap_or(true),
            ),
        })
    }
}

struct CachedWriter {
    date: NaiveDate,
    writer: SharedWriter,
}

/// File-backed `LogSink` with per-command rotation.
pub struct CommandLogger {
    config: ResolvedLogConfig,
    writers: HashMap<String, CachedWriter>,
}

impl CommandLogger {
    /// Apply defaults and make sure the log directory exists.
    ///
    /// # Errors
    ///
    /// Returns `LogError` if the directory cannot be determined or created.
    pub fn new(config: &LogConfig) -> Result<Self, LogError> {
        Self::with_config(ResolvedLogConfig::resolve(config)?)
    }

    /// # Errors
    ///
    /// Returns `LogError::CreateDirectory` if the directory cannot be created.
    pub fn with_config(config: ResolvedLogConfig) -> Result<Self, LogError> {
        std::fs::create_dir_all(&config.directory).map_err(|e| LogError::CreateDirectory {
            path: config.directory.clone(),
            source: e,
        })?;
        Ok(Self {
            config,
            writers: HashMap::new(),
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    fn path_on(&self, token: &str, date: NaiveDate) -> PathBuf {
        self.config
            .directory
            .join(format!("{token}-{}.log", date.format("%Y-%m-%d")))
    }

    /// Flush and drop every cached writer.
    pub fn close(&mut self) {
        for (name, mut cached) in self.writers.drain() {
            if let Err(e) = cached.writer.flush() {
                warn!("Failed to flush log for {name}: {e}");
            }
        }
    }
}

impl LogSink for CommandLogger {
    fn writer_for(&mut self, command_name: &str) -> io::Result<SharedWriter> {
        let token = sanitize_filename(command_name);
        let today = Local::now().date_naive();

        if let Some(cached) = self.writers.get_mut(&token) {
            if cached.date == today {
                return Ok(cached.writer.clone());
            }
            // day rolled over; finish the old file and start today's
            cached.writer.flush()?;
        }

        let path = self.path_on(&token, today);
        debug!("Opening command log {}", path.display());
        let file = rotate::open(&path, &format!("{token}-"), &self.config.policy)?;
        let writer = SharedWriter::new(file);
        self.writers.insert(
            token,
            CachedWriter {
                date: today,
                writer: writer.clone(),
            },
        );
        Ok(writer)
    }

    fn path_for(&self, command_name: &str) -> PathBuf {
        self.path_on(&sanitize_filename(command_name), Local::now().date_naive())
    }
}

impl Drop for CommandLogger {
    fn drop(&mut self) {
        self.close();
    }
}
