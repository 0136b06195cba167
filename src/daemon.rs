//! Waiting for a termination signal in daemon mode

use std::fmt;
use std::io;

use log::debug;

/// The signal that ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("interrupt"),
            ShutdownSignal::Terminate => f.write_str("terminated"),
        }
    }
}

/// Block until SIGINT or SIGTERM arrives. There is no timeout.
///
/// # Errors
///
/// Returns an IO error if the runtime or signal handlers cannot be set up.
pub fn wait_for_shutdown() -> io::Result<ShutdownSignal> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(shutdown_signal())
}

#[cfg(unix)]
async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            debug!("Received Ctrl+C signal");
            Ok(ShutdownSignal::Interrupt)
        }
        _ = terminate.recv() => {
            debug!("Received SIGTERM");
            Ok(ShutdownSignal::Terminate)
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    debug!("Received Ctrl+C signal");
    Ok(ShutdownSignal::Interrupt)
}
