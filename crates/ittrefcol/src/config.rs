use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone};
use tracing_subscriber::EnvFilter;

/// Directory override for the call log.
pub const LOG_DIR_ENV: &str = "INTEL_LIBITTNOTIFY_LOG_DIR";
/// `EnvFilter` directives for the collector's own diagnostics on stderr.
pub const TRACE_ENV: &str = "ITT_REFCOL_TRACE";

const LOG_FILE_PREFIX: &str = "libittnotify_refcol_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub log_dir: PathBuf,
    pub trace_filter: Option<String>,
}

impl CollectorConfig {
    /// Reads [`LOG_DIR_ENV`] and [`TRACE_ENV`]. Without a log directory the
    /// platform temp directory is used.
    pub fn from_env() -> Self {
        let log_dir = std::env::var_os(LOG_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let trace_filter = std::env::var(TRACE_ENV).ok().filter(|f| !f.trim().is_empty());
        Self {
            log_dir,
            trace_filter,
        }
    }

    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            trace_filter: None,
        }
    }

    /// Where the log for a process started now goes.
    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(log_file_name(&Local::now()))
    }
}

/// `libittnotify_refcol_<YYYY><MM><DD><hh><mm><ss>.log`
pub fn log_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{LOG_FILE_PREFIX}{}.log", at.format("%Y%m%d%H%M%S"))
}

/// Installs a stderr fmt subscriber for the collector's diagnostics. Does
/// nothing if the host process already installed one.
pub fn install_trace_subscriber(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
