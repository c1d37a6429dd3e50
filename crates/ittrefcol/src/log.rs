//! The call log: one plain-text line per intercepted ITT call.
//!
//! Lines look like `[INFO] __itt_domain_create(...) - function args: name=app (created new domain)`.
//! The file is opened once per process in append mode. Every line is built
//! in full before the log mutex is taken and is written with a single
//! `write_all`, so lines from concurrent callers never interleave.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::CollectorConfig;
use crate::error::CollectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// A well-formed call.
    Info,
    /// A malformed or ignorable call (null domain, null handle, ...).
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL_ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Sink {
    file: File,
    path: PathBuf,
}

/// Starts disabled; [`CallLog::open`] attaches the file. While disabled every
/// record is dropped.
pub struct CallLog {
    sink: Mutex<Option<Sink>>,
}

impl CallLog {
    pub fn disabled() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }

    /// Opens (or appends to) the log file named by `config`. A log that is
    /// already open is left alone.
    pub fn open(&self, config: &CollectorConfig) -> Result<PathBuf, CollectorError> {
        let mut sink = self.sink.lock();
        if let Some(existing) = sink.as_ref() {
            return Ok(existing.path.clone());
        }
        let path = config.log_file_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CollectorError::LogOpen {
                path: path.clone(),
                source,
            })?;
        *sink = Some(Sink {
            file,
            path: path.clone(),
        });
        Ok(path)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.sink.lock().as_ref().map(|s| s.path.clone())
    }

    pub fn record(&self, level: Level, function: &str, message: fmt::Arguments<'_>) {
        let line = format!("[{level}] {function}(...) - {message}\n");
        let mut sink = self.sink.lock();
        let Some(sink) = sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.file.write_all(line.as_bytes()) {
            debug!(path = %sink.path.display(), %e, "call log write failed");
        }
    }

    pub fn info(&self, function: &str, message: fmt::Arguments<'_>) {
        self.record(Level::Info, function, message);
    }

    pub fn warn(&self, function: &str, message: fmt::Arguments<'_>) {
        self.record(Level::Warn, function, message);
    }

    /// Flushes and closes the file. Returns `false` if it was not open, so a
    /// second close is a no-op.
    pub fn close(&self) -> bool {
        let Some(mut sink) = self.sink.lock().take() else {
            return false;
        };
        let _ = sink.file.flush();
        true
    }
}

impl Default for CallLog {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Reads the whole log at `path` back as lines.
pub fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_follow_the_call_log_format() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::disabled();
        let path = log.open(&CollectorConfig::with_log_dir(dir.path())).unwrap();

        log.info("__itt_task_end", format_args!("function args: domain={}", "app"));
        log.warn("__itt_task_end", format_args!("Incorrect function call"));
        assert!(log.close());

        let lines = read_lines(&path).unwrap();
        assert_eq!(
            lines,
            vec![
                "[INFO] __itt_task_end(...) - function args: domain=app".to_string(),
                "[WARN] __itt_task_end(...) - Incorrect function call".to_string(),
            ]
        );
    }

    #[test]
    fn disabled_log_drops_records() {
        let log = CallLog::disabled();
        log.info("__itt_pause", format_args!("function call"));
        assert!(!log.is_enabled());
        assert!(!log.close());
    }

    #[test]
    fn close_happens_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::disabled();
        log.open(&CollectorConfig::with_log_dir(dir.path())).unwrap();
        assert!(log.close());
        assert!(!log.close());
        log.info("__itt_pause", format_args!("function call"));
    }

    #[test]
    fn missing_directory_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig::with_log_dir(dir.path().join("does/not/exist"));
        let log = CallLog::disabled();
        match log.open(&config) {
            Err(CollectorError::LogOpen { path, .. }) => assert!(path.starts_with(dir.path())),
            other => panic!("expected LogOpen error, got {other:?}"),
        }
        assert!(!log.is_enabled());
    }

    #[test]
    fn level_names() {
        assert_eq!(Level::Fatal.to_string(), "FATAL_ERROR");
        assert_eq!(Level::Warn.as_str(), "WARN");
    }
}
