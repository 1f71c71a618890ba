//! Configuration stored in `~/.dockhand/config.toml`.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [session]
//! connect_timeout_secs = 10
//! staging_dir = "/tmp"
//!
//! [[servers]]
//! name = "prod"
//! host = "10.0.0.5"
//! user = "deploy"
//! password_env = "PROD_SSH_PASSWORD"
//! require_elevation = true
//! ```
//!
//! A missing file yields the defaults.

mod server;

pub use server::ServerEntry;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogConfig;
use crate::remote::{DEFAULT_KEY_FILES, SessionOptions};

/// Largest configuration file accepted (512KB).
const MAX_FILE_SIZE: u64 = 512 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File too large.
    #[error("File too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,

    /// No `[[servers]]` entry with this name.
    #[error("Unknown server: {0}")]
    UnknownServer(String),
}

/// The `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    /// Remote directory receiving build contexts.
    pub staging_dir: String,
    /// Remote directory receiving background job logs.
    pub background_log_dir: String,
    /// Private keys tried in `~/.ssh`, in order.
    pub key_files: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            connect_timeout_secs: options.connect_timeout.as_secs(),
            staging_dir: "/tmp".to_string(),
            background_log_dir: options.background_log_dir,
            key_files: DEFAULT_KEY_FILES.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

impl SessionConfig {
    /// Session options for [`RemoteSession::open_with`].
    ///
    /// [`RemoteSession::open_with`]: crate::remote::RemoteSession::open_with
    #[must_use]
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            key_files: self.key_files.clone(),
            background_log_dir: self.background_log_dir.clone(),
            ..SessionOptions::default()
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LogConfig,
    pub session: SessionConfig,
    pub servers: Vec<ServerEntry>,
}

impl Config {
    /// `~/.dockhand/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dockhand")
            .join("config.toml")
    }

    /// Loads from the default path.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Loads from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if the file is too large, unreadable or invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let metadata = fs::metadata(path)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(ConfigError::FileTooLarge);
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        debug!("Loaded {} server(s) from {}", config.servers.len(), path.display());
        Ok(config)
    }

    /// Writes to `path` through a temporary file, readable only by the
    /// owner on Unix.
    ///
    /// # Errors
    /// Returns error if serialization or any file operation fails.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }

        Ok(())
    }

    /// Looks up a server by name.
    ///
    /// # Errors
    /// Returns `UnknownServer` if there is no such entry.
    pub fn server(&self, name: &str) -> Result<&ServerEntry, ConfigError> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }

    /// Adds or replaces the entry with the same name.
    pub fn upsert_server(&mut self, entry: ServerEntry) {
        match self.servers.iter_mut().find(|s| s.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.servers.push(entry),
        }
    }
}
