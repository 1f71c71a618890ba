//! Remote server descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A remote host and the credentials used to reach it.
///
/// Owned by the caller and handed by value to [`RemoteSession::open`].
///
/// [`RemoteSession::open`]: super::RemoteSession::open
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTarget {
    /// Hostname or IP address.
    pub host: String,
    /// SSH username.
    pub user: String,
    /// Optional password, used for password auth and for elevation.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// SSH port.
    pub port: u16,
    /// Probe for elevation on connect.
    pub require_elevation: bool,
}

impl ServerTarget {
    /// Creates a target on the default port with no password.
    ///
    /// # Panics
    /// Panics if `host` or `user` is empty.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        let host = host.into();
        let user = user.into();
        assert!(!host.is_empty(), "host must not be empty");
        assert!(!user.is_empty(), "user must not be empty");

        Self {
            host,
            user,
            password: None,
            port: DEFAULT_SSH_PORT,
            require_elevation: false,
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the SSH port.
    ///
    /// # Panics
    /// Panics if `port` is zero.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        assert!(port > 0, "port must be positive");
        self.port = port;
        self
    }

    /// Enables the elevation probe.
    #[must_use]
    pub fn with_elevation(mut self, require: bool) -> Self {
        self.require_elevation = require;
        self
    }

    /// Returns `user@host:port`.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    /// Returns true if a password is set.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .field("require_elevation", &self.require_elevation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults() {
        let target = ServerTarget::new("10.0.0.5", "deploy");
        assert_eq!(target.port, DEFAULT_SSH_PORT);
        assert!(!target.require_elevation);
        assert!(!target.has_password());
        assert_eq!(target.connection_string(), "deploy@10.0.0.5:22");
    }

    #[test]
    fn test_debug_hides_password() {
        let target = ServerTarget::new("host", "user").with_password("hunter2");
        let debug = format!("{:?}", target);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_empty_password_is_absent() {
        let target = ServerTarget::new("host", "user").with_password("");
        assert!(!target.has_password());
    }

    #[test]
    #[should_panic(expected = "host must not be empty")]
    fn test_empty_host_panics() {
        let _ = ServerTarget::new("", "user");
    }
}
