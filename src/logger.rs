use std::io::Write;

use chrono::Local;
use log::{Level, Log, Metadata, Record};
use parking_lot::Mutex;

/// Process log backend: timestamped lines on stdout, optionally mirrored to a file.
struct DelivrLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: log::LevelFilter,
}

fn format_line(record: &Record) -> String {
    let stamp = Local::now().format("%Y/%m/%d %H:%M:%S");
    match record.level() {
        Level::Info => format!("{stamp} {}", record.args()),
        level => format!("{stamp} [{level}] {}", record.args()),
    }
}

impl Log for DelivrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record);
        let _ = writeln!(std::io::stdout().lock(), "{line}");

        if let Some(ref file) = self.file {
            let _ = writeln!(file.lock(), "{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Initialize the global logger. Must be called once before any logging.
///
/// The level comes from `RUST_LOG` (default `info`).
///
/// # Panics
///
/// Panics if called more than once.
pub fn init(log_file: Option<std::fs::File>) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    let logger = DelivrLogger {
        file: log_file.map(Mutex::new),
        filter,
    };

    log::set_boxed_logger(Box::new(logger)).expect("logger already initialized");
    log::set_max_level(filter);
}
