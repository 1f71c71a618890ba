//! `[[servers]]` entries.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::remote::{DEFAULT_SSH_PORT, ServerTarget};

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A named server. Passwords are never stored; `password_env` names the
/// environment variable holding one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default)]
    pub require_elevation: bool,
}

impl ServerEntry {
    /// Creates an entry on the default port.
    ///
    /// # Panics
    /// Panics if any argument is empty.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "server name must not be empty");

        Self {
            name,
            host: host.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            password_env: None,
            require_elevation: false,
        }
    }

    /// Password read from `password_env`, if set and non-empty.
    #[must_use]
    pub fn password(&self) -> Option<String> {
        let var = self.password_env.as_deref()?;
        match env::var(var) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => {
                warn!("Password variable {} for server {} is not set", var, self.name);
                None
            }
        }
    }

    /// Builds the connection target, reading the password now.
    ///
    /// # Panics
    /// Panics if the host or user is empty.
    #[must_use]
    pub fn target(&self) -> ServerTarget {
        let mut target = ServerTarget::new(self.host.clone(), self.user.clone())
            .with_port(self.port)
            .with_elevation(self.require_elevation);
        if let Some(password) = self.password() {
            target = target.with_password(password);
        }
        target
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_without_password_env() {
        let entry = ServerEntry::new("prod", "10.0.0.5", "deploy");
        let target = entry.target();
        assert_eq!(target.connection_string(), "deploy@10.0.0.5:22");
        assert!(!target.has_password());
    }

    #[test]
    fn test_target_reads_password_env() {
        let mut entry = ServerEntry::new("stage", "stage.local", "ops");
        entry.password_env = Some("DOCKHAND_TEST_STAGE_PASSWORD".to_string());
        entry.require_elevation = true;
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("DOCKHAND_TEST_STAGE_PASSWORD", "s3cret") };
        let target = entry.target();
        assert!(target.has_password());
        assert!(target.require_elevation);
    }

    #[test]
    fn test_unset_password_env_is_none() {
        let mut entry = ServerEntry::new("x", "h", "u");
        entry.password_env = Some("DOCKHAND_TEST_UNSET_VARIABLE".to_string());
        assert_eq!(entry.password(), None);
    }
}
