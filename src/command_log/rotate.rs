//! Size-based rotation for command logs, backed by `file-rotate`.
//!
//! Rotated files sit next to the active log as `<file>.<timestamp>` (plus
//! `.gz` when compressed). `file-rotate` enforces the size limit, the backup
//! count and compression; files older than `max_age` are removed here when a
//! log is opened.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use log::{debug, warn};

const MEGABYTE: u64 = 1024 * 1024;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub type RotatingFile = FileRotate<AppendTimestamp>;

/// When a file is rotated and which backups survive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Bytes a file may reach before it is rotated
    pub max_size: u64,
    /// Log files older than this are deleted
    pub max_age: Duration,
    /// Number of rotated files kept
    pub max_backups: usize,
    /// Gzip rotated files
    pub compress: bool,
}

impl RotationPolicy {
    #[must_use]
    pub fn new(max_size_mb: u64, max_age_days: u32, max_backups: usize, compress: bool) -> Self {
        Self {
            max_size: max_size_mb.saturating_mul(MEGABYTE),
            max_age: DAY * max_age_days,
            max_backups,
            compress,
        }
    }

    fn content_limit(&self) -> ContentLimit {
        let bytes = usize::try_from(self.max_size).unwrap_or(usize::MAX).max(1);
        ContentLimit::Bytes(bytes)
    }

    fn file_limit(&self) -> FileLimit {
        if self.max_backups == 0 {
            FileLimit::Unlimited
        } else {
            FileLimit::MaxFiles(self.max_backups)
        }
    }

    fn compression(&self) -> Compression {
        if self.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        }
    }
}

/// Open `path` for appending with rotation applied.
///
/// Expired logs sharing `expire_prefix` are deleted first.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened. The parent directory
/// must already exist.
pub fn open(path: &Path, expire_prefix: &str, policy: &RotationPolicy) -> io::Result<RotatingFile> {
    // surface open errors here, file-rotate would swallow them
    OpenOptions::new().create(true).append(true).open(path)?;

    if let Some(dir) = path.parent()
        && let Err(e) = remove_expired(dir, expire_prefix, path, policy.max_age)
    {
        warn!("Failed to prune old logs in {}: {e}", dir.display());
    }

    Ok(FileRotate::new(
        path,
        AppendTimestamp::default(policy.file_limit()),
        policy.content_limit(),
        policy.compression(),
        #[cfg(unix)]
        None,
    ))
}

/// Delete files in `dir` starting with `prefix` whose last change is older
/// than `max_age`. `active` is never removed.
fn remove_expired(dir: &Path, prefix: &str, active: &Path, max_age: Duration) -> io::Result<()> {
    if max_age.is_zero() {
        return Ok(());
    }
    let now = SystemTime::now();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path == active || !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            debug!("Removing old log {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Read, Write};

    use flate2::read::GzDecoder;

    use super::*;

    fn policy(max_size: u64, max_backups: usize, compress: bool) -> RotationPolicy {
        RotationPolicy {
            max_size,
            max_age: DAY * 30,
            max_backups,
            compress,
        }
    }

    fn backups(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("job.log."))
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_policy_from_config_units() {
        let p = RotationPolicy::new(10, 30, 5, true);
        assert_eq!(p.max_size, 10 * 1024 * 1024);
        assert_eq!(p.max_age, Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        std::fs::write(&path, "first\n").unwrap();
        let mut file = open(&path, "job", &policy(1024, 5, false)).unwrap();
        file.write_all(b"second\n").unwrap();
        file.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let mut file = open(&path, "job", &policy(16, 5, false)).unwrap();
        for _ in 0..3 {
            file.write_all(b"0123456789\n").unwrap();
        }
        file.flush().unwrap();

        let rotated = backups(dir.path());
        assert!(!rotated.is_empty());
        assert!(std::fs::metadata(&path).unwrap().len() <= 16);
        let total: u64 = rotated
            .iter()
            .chain(std::iter::once(&path))
            .map(|p| std::fs::metadata(p).unwrap().len())
            .sum();
        assert_eq!(total, 33);
    }

    #[test]
    fn test_keeps_at_most_max_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let mut file = open(&path, "job", &policy(4, 2, false)).unwrap();
        for _ in 0..10 {
            file.write_all(b"full").unwrap();
        }
        file.flush().unwrap();
        let rotated = backups(dir.path());
        assert!(!rotated.is_empty());
        assert!(rotated.len() <= 2, "got: {rotated:?}");
    }

    #[test]
    fn test_compresses_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let mut file = open(&path, "job", &policy(8, 5, true)).unwrap();
        file.write_all(b"12345678").unwrap();
        file.write_all(b"next").unwrap();
        file.flush().unwrap();

        let rotated = backups(dir.path());
        assert!(!rotated.is_empty());
        let mut text = String::new();
        for backup in &rotated {
            assert_eq!(backup.extension().unwrap(), "gz");
            GzDecoder::new(File::open(backup).unwrap())
                .read_to_string(&mut text)
                .unwrap();
        }
        assert!(text.starts_with("12345678"), "got: {text}");
    }

    #[test]
    fn test_removes_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("job-2020-01-01.log");
        let fresh = dir.path().join("job-2026-10-15.log");
        let other = dir.path().join("other-2020-01-01.log");
        for p in [&old, &fresh, &other] {
            std::fs::write(p, "x").unwrap();
        }
        let long_ago = SystemTime::now() - DAY * 40;
        for p in [&old, &other] {
            File::options()
                .write(true)
                .open(p)
                .unwrap()
                .set_modified(long_ago)
                .unwrap();
        }

        let path = dir.path().join("job-2026-10-16.log");
        open(&path, "job-", &policy(1024, 5, false)).unwrap();
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
        assert!(path.exists());
    }

    #[test]
    fn test_open_fails_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("job.log");
        assert!(open(&path, "job", &policy(1024, 5, false)).is_err());
        assert!(!path.parent().unwrap().exists());
    }
}
