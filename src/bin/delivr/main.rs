mod init;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use delivr::command_log::CommandLogger;
use delivr::load_config;
use delivr::notifier::Notifier;
use delivr::notifier::discord::DiscordWebhook;
use delivr::runner::Runner;

#[derive(Parser, Debug)]
#[command(
    name = "delivr",
    version,
    about = "Run configured commands and report their results to a Discord webhook"
)]
struct Cli {
    /// Keep running after the commands finish, until SIGINT or SIGTERM
    #[arg(long)]
    daemon: bool,

    /// Path to config file (auto-detected if not specified)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an example configuration file and exit
    #[arg(long)]
    init: bool,

    /// Where --init writes the configuration file
    #[arg(long, default_value = "config.json")]
    out: PathBuf,

    /// Stop at the first failing command
    #[arg(long)]
    fail_fast: bool,

    /// Also write process log lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            log::logger().flush();
            ExitCode::FAILURE
        }
    }
}

fn notify_or_warn(notifier: &impl Notifier, content: &str, what: &str) {
    if let Err(e) = notifier.send(content) {
        warn!("Could not send {what} message: {e}");
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // install the logger even when the log file is unusable so the error is reported
    let (log_file, log_file_error) = match cli.log_file.as_ref().map(std::fs::File::create).transpose() {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };
    delivr::logger::init(log_file);
    if let Some(e) = log_file_error {
        return Err(format!("cannot open log file: {e}").into());
    }

    if cli.init {
        return init::run(&cli.out);
    }

    info!("Starting Delivr - command runner with Discord notifications");

    let loaded = load_config(cli.config.as_deref())?;
    info!("Configuration loaded from: {}", loaded.path.display());
    let config = loaded.config;

    let discord = DiscordWebhook::new(&config.discord.channel_id)?;
    notify_or_warn(&discord, "🚀 Delivr service started", "startup");

    let mut logs = CommandLogger::new(&config.logs.clone().unwrap_or_default())?;
    info!("Writing command logs to {}", logs.directory().display());

    let mut runner = Runner::from_config(&discord, &mut logs, &config);
    if cli.fail_fast {
        if let Err(e) = runner.execute_all(&config.commands) {
            error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    } else {
        let summary = runner.run_all(&config.commands);
        info!("{summary}");
    }

    if !cli.daemon {
        notify_or_warn(&discord, "✅ Delivr - all commands executed", "completion");
        info!("All commands executed, shutting down...");
        return Ok(ExitCode::SUCCESS);
    }

    info!("Running in daemon mode, press Ctrl+C to exit");
    let signal = delivr::daemon::wait_for_shutdown()?;
    info!("Received signal {signal}, shutting down...");

    notify_or_warn(&discord, "🛑 Delivr service stopping", "shutdown");
    logs.close();
    info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}
