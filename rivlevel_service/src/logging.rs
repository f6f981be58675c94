/// Structured logging for the river level service
///
/// Thin helpers over `tracing` that attach a source tag and an optional gauge
/// name to every event, plus failure classification for fetch errors and
/// per-cycle summaries. Console output always; file output when configured.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt as tfmt;
use tracing_subscriber::prelude::*;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Fetch,
    Parse,
    Date,
    Store,
    Publish,
    Config,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Fetch => write!(f, "FETCH"),
            DataSource::Parse => write!(f, "PARSE"),
            DataSource::Date => write!(f, "DATE"),
            DataSource::Store => write!(f, "STORE"),
            DataSource::Publish => write!(f, "PUBLISH"),
            DataSource::Config => write!(f, "CONFIG"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Page temporarily unavailable; the next cycle will likely succeed
    Expected,
    /// Points at a configuration problem or a change in the page
    Unexpected,
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Log file for one run: `LOGS/rivlevel.log` becomes
/// `LOGS/rivlevel_20191204_220620.log` for a run started at that instant.
pub fn per_run_log_path(base: &Path, started: DateTime<Utc>) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("rivlevel");
    let mut name = format!("{}_{}", stem, started.format("%Y%m%d_%H%M%S"));
    if let Some(ext) = base.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    base.with_file_name(name)
}

/// Installs the global subscriber. `log_file` is the exact file to write;
/// its directory is created if missing. Returns an error string if the log
/// file cannot be opened or a subscriber is already installed.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&Path>,
    console_timestamps: bool,
) -> Result<(), String> {
    let console = if console_timestamps {
        tfmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    } else {
        tfmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create log directory {}: {}", dir.display(), e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;
            Some(
                tfmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(min_level.filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("Failed to install logger: {}", e))
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

pub fn info(source: DataSource, gauge: Option<&str>, message: &str) {
    tracing::info!(source = %source, gauge = gauge.unwrap_or("-"), "{}", message);
}

pub fn warn(source: DataSource, gauge: Option<&str>, message: &str) {
    tracing::warn!(source = %source, gauge = gauge.unwrap_or("-"), "{}", message);
}

pub fn error(source: DataSource, gauge: Option<&str>, message: &str) {
    tracing::error!(source = %source, gauge = gauge.unwrap_or("-"), "{}", message);
}

pub fn debug(source: DataSource, gauge: Option<&str>, message: &str) {
    tracing::debug!(source = %source, gauge = gauge.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a page fetch failure from its rendered error message.
pub fn classify_fetch_failure(error_message: &str) -> FailureType {
    let lower = error_message.to_ascii_lowercase();
    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("status 502")
        || lower.contains("status 503")
        || lower.contains("status 504")
    {
        FailureType::Expected
    } else if lower.contains("status 404") || lower.contains("status 403") || lower.contains("builder") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

pub fn log_fetch_failure(gauge: &str, url: &str, error_message: &str) {
    let failure = classify_fetch_failure(error_message);
    let message = format!("[{}] fetch of {} failed: {}", failure, url, error_message);
    match failure {
        FailureType::Expected => warn(DataSource::Fetch, Some(gauge), &message),
        _ => error(DataSource::Fetch, Some(gauge), &message),
    }
}

/// Summarise one scrape cycle at a level matching its outcome.
pub fn log_cycle_summary(total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Scrape cycle complete: {}/{} gauges stored, {} failed",
        successful, total, failed
    );
    if failed == 0 {
        info(DataSource::System, None, &message);
    } else if successful == 0 {
        error(DataSource::System, None, &message);
    } else {
        warn(DataSource::System, None, &message);
    }
}
