//! Docker operation errors.

use std::io;

use thiserror::Error;

use crate::remote::RemoteError;

/// Longest excerpt of bad output kept in an error.
pub const MAX_EXCERPT_CHARS: usize = 200;

/// Broad class of a [`DockerError`], for callers choosing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host unreachable or authentication failed.
    Connection,
    /// Denied even after elevation.
    Permission,
    /// The container or image does not exist.
    NotFound,
    /// Output that should have been structured could not be decoded.
    MalformedOutput,
    /// A port, volume or env pair to remove or replace is not present.
    StaleReference,
    /// The command ran and the CLI reported failure.
    CommandFailed,
    /// Local file or archive problem.
    Local,
}

/// Errors from container and image operations.
#[derive(Debug, Error)]
pub enum DockerError {
    /// Transport failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The object does not exist on the host.
    #[error("{what} {id} not found")]
    NotFound {
        /// "Container" or "Image".
        what: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Output could not be decoded.
    #[error("Malformed {context} output: {excerpt}")]
    MalformedOutput {
        /// Which command produced it.
        context: String,
        /// Leading part of the offending text.
        excerpt: String,
    },

    /// Removal or replacement of a pair that is not present.
    #[error("{kind} {pair} not found.")]
    StaleReference {
        /// "Port", "Volume" or "Env".
        kind: &'static str,
        /// Pair in its display encoding.
        pair: String,
    },

    /// A mapping string could not be parsed.
    #[error("Invalid {kind} mapping: {value}")]
    InvalidMapping {
        /// "Port", "Volume" or "Env".
        kind: &'static str,
        /// Rejected text.
        value: String,
    },

    /// The CLI reported failure.
    #[error("`{command}` failed: {output}")]
    CommandFailed {
        /// Command that failed.
        command: String,
        /// Its output.
        output: String,
        /// Exit status, if reported.
        exit_status: Option<i32>,
    },

    /// A build context could not be packed.
    #[error("Archive error for {path}: {reason}")]
    Archive {
        /// Local path being packed.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// Local I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DockerError {
    /// Builds a `MalformedOutput` error holding a truncated excerpt.
    #[must_use]
    pub fn malformed(context: impl Into<String>, output: &str) -> Self {
        Self::MalformedOutput {
            context: context.into(),
            excerpt: excerpt(output),
        }
    }

    /// Copy of an error that reports what the host answered, as opposed to
    /// a transport or local failure. `None` for the latter.
    #[must_use]
    pub fn definitive_copy(&self) -> Option<Self> {
        match self {
            Self::NotFound { what, id } => Some(Self::NotFound { what, id: id.clone() }),
            Self::MalformedOutput { context, excerpt } => Some(Self::MalformedOutput {
                context: context.clone(),
                excerpt: excerpt.clone(),
            }),
            _ => None,
        }
    }

    /// Returns the broad class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(RemoteError::PermissionDenied { .. }) => ErrorKind::Permission,
            Self::Remote(RemoteError::Io(_)) => ErrorKind::Local,
            Self::Remote(_) => ErrorKind::Connection,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            Self::StaleReference { .. } => ErrorKind::StaleReference,
            Self::CommandFailed { .. } => ErrorKind::CommandFailed,
            Self::InvalidMapping { .. } | Self::Archive { .. } | Self::Io(_) => ErrorKind::Local,
        }
    }
}

/// Returns at most [`MAX_EXCERPT_CHARS`] characters of `text`.
#[must_use]
pub fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_reference_message() {
        let err = DockerError::StaleReference {
            kind: "Port",
            pair: "8080:80".to_string(),
        };
        assert_eq!(err.to_string(), "Port 8080:80 not found.");
        assert_eq!(err.kind(), ErrorKind::StaleReference);
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let long = "x".repeat(500);
        let err = DockerError::malformed("inspect", &long);
        match err {
            DockerError::MalformedOutput { excerpt, .. } => {
                assert_eq!(excerpt.len(), MAX_EXCERPT_CHARS + 3);
                assert!(excerpt.ends_with("..."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_kind_of_remote_errors() {
        let denied = DockerError::from(RemoteError::PermissionDenied {
            command: "docker ps".to_string(),
            output: "permission denied".to_string(),
        });
        assert_eq!(denied.kind(), ErrorKind::Permission);

        let down = DockerError::from(RemoteError::Connection {
            host: "h".to_string(),
            reason: "refused".to_string(),
        });
        assert_eq!(down.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_definitive_copy() {
        let missing = DockerError::NotFound {
            what: "Container",
            id: "abc".to_string(),
        };
        let copy = missing.definitive_copy().map(|e| e.to_string());
        assert_eq!(copy.as_deref(), Some("Container abc not found"));

        let down = DockerError::from(RemoteError::Connection {
            host: "h".to_string(),
            reason: "refused".to_string(),
        });
        assert!(down.definitive_copy().is_none());
    }
}
