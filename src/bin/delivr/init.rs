use std::path::Path;
use std::process::ExitCode;

use log::{info, warn};

/// Write the example configuration to `out`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn run(out: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if out.exists() {
        warn!("Overwriting existing file {}", out.display());
    }
    info!("Generating default configuration file at: {}", out.display());
    delivr::config_file::create_default(out)?;
    info!(
        "Default configuration created successfully. Please edit {} with your Discord webhook URL.",
        out.display()
    );
    Ok(ExitCode::SUCCESS)
}
