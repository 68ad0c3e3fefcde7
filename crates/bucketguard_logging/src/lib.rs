//! Tracing setup shared by Bucketguard binaries.
//!
//! Every binary logs to two places:
//! - a size-rotated file under `$BUCKETGUARD_HOME/logs/<app>.log`
//! - stderr, so stdout stays free for scan results and JSON output

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "bucketguard=info,bucketguard_av=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a single binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter to stderr (debug output when RUST_LOG asks for it).
    pub verbose: bool,
    /// Only warnings and errors reach stderr (used for `--json` output).
    pub quiet: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// A log directory that cannot be created is not fatal: the binary keeps
/// logging to stderr and reports the problem once.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_filter = env_filter();

    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else if config.verbose {
        env_filter()
    } else {
        EnvFilter::new("warn,bucketguard=info")
    };

    let file_layer = match ensure_logs_dir()
        .and_then(|dir| SharedRollingWriter::new(dir, config.app_name))
    {
        Ok(writer) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        ),
        Err(err) => {
            eprintln!("Warning: file logging disabled: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    Ok(())
}

/// RUST_LOG when set, otherwise the crate defaults.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get the Bucketguard home directory: ~/.bucketguard
///
/// Priority:
/// 1) BUCKETGUARD_HOME
/// 2) the user's home directory
/// 3) ./.bucketguard
pub fn bucketguard_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("BUCKETGUARD_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".bucketguard"))
        .unwrap_or_else(|| PathBuf::from(".").join(".bucketguard"))
}

/// Get the logs directory: ~/.bucketguard/logs
pub fn logs_dir() -> PathBuf {
    bucketguard_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: PathBuf, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut appender = Self {
            dir,
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        let (file, size) = appender.open_current_file()?;
        appender.file = Some(file);
        appender.current_size = size;
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn open_current_file(&self) -> io::Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        self.shift_rotated_files()?;

        let (file, size) = self.open_current_file()?;
        self.file = Some(file);
        self.current_size = size;
        Ok(())
    }

    /// `<app>.log` becomes `<app>.log.1`, `.1` becomes `.2`, and the oldest is dropped.
    fn shift_rotated_files(&self) -> io::Result<()> {
        let max_index = self.max_files.saturating_sub(1);
        if max_index == 0 {
            return fs::remove_file(self.current_path()).or_else(ignore_missing);
        }

        fs::remove_file(self.rotated_path(max_index)).or_else(ignore_missing)?;

        for idx in (1..max_index).rev() {
            let src = self.rotated_path(idx);
            if src.exists() {
                fs::rename(&src, self.rotated_path(idx + 1))?;
            }
        }

        let current = self.current_path();
        if current.exists() {
            fs::rename(current, self.rotated_path(1))?;
        }

        Ok(())
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn new(dir: PathBuf, base_name: &str) -> Result<Self> {
        let appender = RollingFileAppender::new(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }
}

struct SharedRollingWriterGuard {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedRollingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedRollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("bucketguard"), "bucketguard");
        assert_eq!(sanitize_name("scan worker/1"), "scan_worker_1");
    }

    #[test]
    fn test_rotation_keeps_bounded_file_count() {
        let tmp = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "app", 3, 16).unwrap();

        for _ in 0..10 {
            appender.write_all(b"0123456789abcdef").unwrap();
        }
        appender.flush().unwrap();

        assert!(tmp.path().join("app.log").exists());
        assert!(tmp.path().join("app.log.1").exists());
        assert!(tmp.path().join("app.log.2").exists());
        assert!(!tmp.path().join("app.log.3").exists());
    }

    #[test]
    fn test_single_file_mode_truncates_instead_of_rotating() {
        let tmp = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "app", 1, 8).unwrap();

        appender.write_all(b"12345678").unwrap();
        appender.write_all(b"abcdefgh").unwrap();
        appender.flush().unwrap();

        let content = fs::read_to_string(tmp.path().join("app.log")).unwrap();
        assert_eq!(content, "abcdefgh");
        assert!(!tmp.path().join("app.log.1").exists());
    }
}
