//! File logging for dockhand.
//!
//! Each run writes one timestamped file under `~/.dockhand/logs/`. Files
//! older than the retention period are removed when logging starts.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 72;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix of every log file name.
const LOG_FILE_PREFIX: &str = "dockhand_";

/// The `[logging]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether a log file is written at all.
    pub enabled: bool,
    /// trace, debug, info, warn, error or off.
    pub level: String,
    /// Age in hours after which old log files are deleted.
    pub retention_hours: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: DEFAULT_LOG_LEVEL.to_string(),
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
        }
    }
}

impl LogConfig {
    /// Normalizes a level name; unknown names fall back to the default.
    #[must_use]
    pub fn parse_level(value: &str) -> &'static str {
        match value.trim().to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            "off" | "none" | "disabled" => "off",
            _ => DEFAULT_LOG_LEVEL,
        }
    }

    /// True when nothing should be written.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        !self.enabled || Self::parse_level(&self.level) == "off"
    }
}

/// `~/.dockhand/logs`.
#[must_use]
pub fn log_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dockhand")
        .join("logs")
}

/// File name for a run starting now.
#[must_use]
pub fn log_file_name() -> String {
    let now = chrono::Local::now();
    format!("{}{}.log", LOG_FILE_PREFIX, now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Deletes `.log` files in `dir` older than `retention_hours`.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let expired = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);

        if expired && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Starts file logging and returns the log file path, or `None` when
/// logging is disabled.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
/// Returns error if the log directory or file cannot be created.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    if config.is_silent() {
        return Ok(None);
    }

    let dir = log_directory();
    fs::create_dir_all(&dir)?;
    let deleted = cleanup_old_logs(&dir, config.retention_hours)?;

    let path = dir.join(log_file_name());
    let file = File::create(&path)?;

    let level = LogConfig::parse_level(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(false);

    // A subscriber may already be installed when embedded in another program.
    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        return Ok(None);
    }

    tracing::info!("dockhand {} logging to {}", env!("CARGO_PKG_VERSION"), path.display());
    if deleted > 0 {
        tracing::info!("Removed {} expired log file(s)", deleted);
    }

    Ok(Some(path))
}
