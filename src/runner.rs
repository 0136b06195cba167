//! Command execution with output capture, log files and notifications.

use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use chrono::{Local, SecondsFormat};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::command_log::{LogSink, SharedWriter};
use crate::config_file::{CommandSpec, Config};
use crate::notifier::{Notifier, NotifyError};

/// Maximum number of characters of output quoted in a notification
pub const OUTPUT_LIMIT: usize = 1500;
pub const TRUNCATED_SUFFIX: &str = "... (truncated)";

const SEPARATOR: &str = "==================================================";

/// Why a command did not succeed
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Status(ExitStatus),
    #[error("failed to read command output: {0}")]
    Output(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to send start message: {0}")]
    StartNotification(#[source] NotifyError),
    #[error("failed to send result message: {0}")]
    ResultNotification(#[source] NotifyError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("command '{name}' failed: {source}")]
    Command {
        name: String,
        #[source]
        source: Box<RunError>,
    },
}

/// Outcome of a lenient batch run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    /// Names of the commands that returned an error, in run order
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} commands: {} passed, {} failed ({})",
            self.total(),
            self.succeeded,
            self.failed.len(),
            format_duration(self.elapsed)
        )
    }
}

/// Output captured from one process
#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Runs commands one at a time, logging their output and reporting each
/// start and result through a `Notifier`.
pub struct Runner<'a> {
    notifier: &'a dyn Notifier,
    logs: &'a mut dyn LogSink,
    working_dir: Option<PathBuf>,
    docker_host: Option<String>,
}

impl<'a> Runner<'a> {
    pub fn new(
        notifier: &'a dyn Notifier,
        logs: &'a mut dyn LogSink,
        working_dir: Option<PathBuf>,
        docker_host: Option<String>,
    ) -> Self {
        Self {
            notifier,
            logs,
            working_dir: working_dir.filter(|d| !d.as_os_str().is_empty()),
            docker_host: docker_host.filter(|h| !h.is_empty()),
        }
    }

    /// Runner using the global working directory and Docker host of `config`.
    pub fn from_config(
        notifier: &'a dyn Notifier,
        logs: &'a mut dyn LogSink,
        config: &Config,
    ) -> Self {
        Self::new(
            notifier,
            logs,
            config.working_dir.clone(),
            config.docker_host().map(str::to_string),
        )
    }

    /// Directory the command runs in: its own, else the global one.
    /// `None` means the process's current directory.
    fn resolve_dir(&self, cmd: &CommandSpec) -> Option<PathBuf> {
        cmd.dir
            .clone()
            .filter(|d| !d.as_os_str().is_empty())
            .or_else(|| self.working_dir.clone())
    }

    /// `DOCKER_HOST` is set for `docker` even when `envVars` are given; a
    /// `DOCKER_HOST=` entry in `envVars` overrides it.
    fn build_process(&self, cmd: &CommandSpec) -> ProcessCommand {
        let mut process = ProcessCommand::new(&cmd.command);
        process.args(&cmd.args);

        if let Some(host) = &self.docker_host
            && cmd.command == "docker"
        {
            process.env("DOCKER_HOST", host);
        }

        if let Some(dir) = self.resolve_dir(cmd) {
            process.current_dir(dir);
        }

        for var in &cmd.env_vars {
            match var.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    process.env(key, value);
                }
                _ => warn!(
                    "Ignoring malformed environment entry '{var}' for command '{}'",
                    cmd.name
                ),
            }
        }

        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        process
    }

    /// Run one command and report it.
    ///
    /// # Errors
    ///
    /// Returns `RunError::StartNotification` if the start message cannot be
    /// sent (the command is not run), `RunError::ResultNotification` if the
    /// result message cannot be sent, and otherwise `RunError::Exec` when the
    /// command itself failed. A log file that cannot be opened is only warned
    /// about; the command still runs with its output discarded from the log.
    pub fn execute(&mut self, cmd: &CommandSpec) -> Result<(), RunError> {
        let start = Instant::now();

        self.notifier
            .send(&start_message(cmd))
            .map_err(RunError::StartNotification)?;

        let mut process = self.build_process(cmd);
        let display_dir = self
            .resolve_dir(cmd)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();

        let mut log = self.logs.writer_for(&cmd.name).unwrap_or_else(|e| {
            warn!("Failed to open log for '{}', output will not be logged: {e}", cmd.name);
            SharedWriter::new(io::sink())
        });
        write_log(&mut log, &log_header(cmd, &display_dir));

        debug!("Spawning {:?}", process);
        let (captured, outcome) = run_process(&mut process, &cmd.command, &log);

        write_log(&mut log, &log_footer(outcome.as_ref().err()));
        if let Err(e) = log.flush() {
            warn!("Failed to flush log for '{}': {e}", cmd.name);
        }

        let message = result_message(
            cmd,
            start.elapsed(),
            outcome.as_ref().err(),
            &captured,
            &self.logs.path_for(&cmd.name),
        );
        self.notifier
            .send(&message)
            .map_err(RunError::ResultNotification)?;

        outcome.map_err(RunError::from)
    }

    /// Run commands in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Command` wrapping the first command's error.
    pub fn execute_all(&mut self, commands: &[CommandSpec]) -> Result<(), RunError> {
        for cmd in commands {
            self.execute(cmd).map_err(|e| RunError::Command {
                name: cmd.name.clone(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    /// Run every command in order, logging failures and carrying on.
    pub fn run_all(&mut self, commands: &[CommandSpec]) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        for cmd in commands {
            info!("Running command '{}'", cmd.name);
            match self.execute(cmd) {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    error!("Error executing command '{}': {e}", cmd.name);
                    summary.failed.push(cmd.name.clone());
                }
            }
        }
        summary.elapsed = started.elapsed();
        summary
    }
}

/// Spawn the process and drain both pipes into memory and the log.
fn run_process(
    process: &mut ProcessCommand,
    program: &str,
    log: &SharedWriter,
) -> (Captured, Result<(), ExecError>) {
    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(e) => {
            return (
                Captured::default(),
                Err(ExecError::Spawn {
                    program: program.to_string(),
                    source: e,
                }),
            );
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr) = std::thread::scope(|s| {
        let out = s.spawn(|| tee(stdout, log.clone()));
        let err = s.spawn(|| tee(stderr, log.clone()));
        (join_reader(out), join_reader(err))
    });

    let status = child.wait().map_err(ExecError::Output);
    let (stdout, stderr) = match (stdout, stderr) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(e), _) | (_, Err(e)) => return (Captured::default(), Err(ExecError::Output(e))),
    };
    let captured = Captured { stdout, stderr };

    let outcome = status.and_then(|status| {
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Status(status))
        }
    });
    (captured, outcome)
}

fn join_reader(handle: std::thread::ScopedJoinHandle<'_, io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")))
}

/// Copy `reader` into memory and the log until EOF.
fn tee<R: Read>(reader: Option<R>, mut log: SharedWriter) -> io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    let mut log_ok = true;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        captured.extend_from_slice(&buf[..n]);
        if log_ok && let Err(e) = log.write_all(&buf[..n]) {
            warn!("Failed to write command output to log: {e}");
            log_ok = false;
        }
    }
    Ok(captured)
}

fn write_log(log: &mut SharedWriter, text: &str) {
    if let Err(e) = log.write_all(text.as_bytes()) {
        warn!("Failed to write to command log: {e}");
    }
}

fn log_header(cmd: &CommandSpec, dir: &Path) -> String {
    format!(
        "\n\n{SEPARATOR}\nCommand: {}\nDescription: {}\nExecuted at: {}\nWorking Directory: {}\nFull Command: {}\n{SEPARATOR}\n\n",
        cmd.name,
        cmd.description,
        Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        dir.display(),
        cmd.command_line(),
    )
}

fn log_footer(error: Option<&ExecError>) -> String {
    let status = match error {
        Some(e) => format!("Command failed with error: {e}"),
        None => "Command completed successfully".to_string(),
    };
    format!("\n\n{SEPARATOR}\n{status}\n{SEPARATOR}\n\n")
}

fn start_message(cmd: &CommandSpec) -> String {
    format!(
        "🏃 Running command: **{}**\n> {}",
        cmd.name, cmd.description
    )
}

/// Cut `text` to `OUTPUT_LIMIT` characters, marking the cut.
#[must_use]
pub fn truncate_output(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(OUTPUT_LIMIT) {
        Some((idx, _)) => Cow::Owned(format!("{}{TRUNCATED_SUFFIX}", &text[..idx])),
        None => Cow::Borrowed(text),
    }
}

fn format_duration(d: Duration) -> String {
    format!("{:.2} seconds", d.as_secs_f64())
}

fn result_message(
    cmd: &CommandSpec,
    elapsed: Duration,
    error: Option<&ExecError>,
    captured: &Captured,
    log_path: &Path,
) -> String {
    let took = format_duration(elapsed);
    let mut message = match error {
        Some(e) => {
            let mut m = format!("❌ Command **{}** failed (took {took})\n", cmd.name);
            if captured.stderr.is_empty() {
                m.push_str(&format!("Error: {e}"));
            } else {
                let text = String::from_utf8_lossy(&captured.stderr);
                m.push_str(&format!("```\n{}\n```", truncate_output(&text)));
            }
            m
        }
        None => {
            let mut m = format!(
                "✅ Command **{}** completed successfully (took {took})\n",
                cmd.name
            );
            if !captured.stdout.is_empty() {
                let text = String::from_utf8_lossy(&captured.stdout);
                m.push_str(&format!("```\n{}\n```", truncate_output(&text)));
            }
            m
        }
    };
    message.push_str(&format!("\n📄 Log file: `{}`", log_path.display()));
    message
}
