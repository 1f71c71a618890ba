//! Remote command execution over SSH.
//!
//! A [`RemoteSession`] owns one authenticated SSH connection to a
//! [`ServerTarget`]. Callers drive it through the [`RemoteExecutor`] trait,
//! which is also implemented by [`testing::ScriptedExecutor`] so that
//! everything above the transport can run without a network.

mod executor;
mod session;
pub mod shell;
mod target;
pub mod testing;

use std::io;

use thiserror::Error;

pub use executor::{BACKGROUND_LOG_NAME, BackgroundJob, CommandOutput, RemoteExecutor};
pub use session::{DEFAULT_KEY_FILES, RemoteSession, SessionOptions};
pub use target::{DEFAULT_SSH_PORT, ServerTarget};

/// Errors raised by the remote transport.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The host could not be reached or the SSH handshake failed.
    #[error("Connection to {host} failed: {reason}")]
    Connection {
        /// `user@host:port` of the target.
        host: String,
        /// What went wrong.
        reason: String,
    },

    /// Every authentication method was rejected.
    #[error("Authentication to {host} failed: {}", attempts.join("; "))]
    Authentication {
        /// `user@host:port` of the target.
        host: String,
        /// One entry per method tried.
        attempts: Vec<String>,
    },

    /// A channel could not be opened, written or read.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A file transfer failed.
    #[error("Transfer of {path} failed: {reason}")]
    Transfer {
        /// Remote path involved.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The command was denied even after elevation.
    #[error("Permission denied running `{command}`: {output}")]
    PermissionDenied {
        /// Command as requested by the caller.
        command: String,
        /// Output of the elevated attempt.
        output: String,
    },

    /// Local I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RemoteError {
    /// Returns true for failures that end the session.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Authentication { .. })
    }
}
