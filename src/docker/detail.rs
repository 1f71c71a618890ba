//! Immutable container descriptors and the edits applied to them.
//!
//! Editing is two-step: [`ContainerDetail::apply`] returns a new descriptor
//! and leaves the host alone; [`ContainerLifecycle::commit`] recreates the
//! container from a descriptor. Between the delete and the create of a
//! commit the container does not exist, so keep the descriptor around until
//! the commit has returned.
//!
//! [`ContainerLifecycle::commit`]: super::lifecycle::ContainerLifecycle::commit

use std::fmt;

use serde::{Deserialize, Serialize};

use super::container::ContainerStatus;
use super::error::DockerError;
use super::mapping::{EnvVar, MappingSet, PortMapping, VolumeMapping};

/// Restart policy rendered as `--restart always`.
pub const RESTART_ALWAYS: &str = "always";

/// Snapshot of a container's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    /// Image as `repository:tag`.
    pub image: String,
    pub status: ContainerStatus,
    pub ports: MappingSet<PortMapping>,
    pub volumes: MappingSet<VolumeMapping>,
    pub env: MappingSet<EnvVar>,
    /// Space-joined argv; empty for the image default.
    pub command: String,
    /// Restart policy name as reported by the daemon.
    pub restart_policy: Option<String>,
}

impl ContainerDetail {
    /// Returns a copy with `edit` applied.
    ///
    /// # Errors
    /// Returns `StaleReference` when removing or replacing a pair that is
    /// not present.
    pub fn apply(&self, edit: &ContainerEdit) -> Result<Self, DockerError> {
        let mut next = self.clone();
        match edit {
            ContainerEdit::AddPort(port) => next.ports.add(port.clone()),
            ContainerEdit::RemovePort(port) => {
                next.ports.remove(port)?;
            }
            ContainerEdit::ReplacePort { from, to } => next.ports.replace(from, to.clone())?,
            ContainerEdit::AddVolume(volume) => next.volumes.add(volume.clone()),
            ContainerEdit::RemoveVolume(volume) => {
                next.volumes.remove(volume)?;
            }
            ContainerEdit::ReplaceVolume { from, to } => next.volumes.replace(from, to.clone())?,
            ContainerEdit::AddEnv(var) => next.env.add(var.clone()),
            ContainerEdit::RemoveEnv(var) => {
                next.env.remove(var)?;
            }
            ContainerEdit::ReplaceEnv { from, to } => next.env.replace(from, to.clone())?,
            ContainerEdit::SetCommand(command) => next.command = command.trim().to_string(),
        }
        Ok(next)
    }

    /// Applies `edits` in order; stops at the first failure.
    ///
    /// # Errors
    /// Same as [`apply`](Self::apply).
    pub fn apply_all(&self, edits: &[ContainerEdit]) -> Result<Self, DockerError> {
        edits.iter().try_fold(self.clone(), |detail, edit| detail.apply(edit))
    }

    /// Returns true if the daemon restarts this container unconditionally.
    #[must_use]
    pub fn restarts_always(&self) -> bool {
        self.restart_policy.as_deref() == Some(RESTART_ALWAYS)
    }
}

/// One configuration change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerEdit {
    AddPort(PortMapping),
    RemovePort(PortMapping),
    ReplacePort { from: PortMapping, to: PortMapping },
    AddVolume(VolumeMapping),
    RemoveVolume(VolumeMapping),
    ReplaceVolume { from: VolumeMapping, to: VolumeMapping },
    AddEnv(EnvVar),
    RemoveEnv(EnvVar),
    ReplaceEnv { from: EnvVar, to: EnvVar },
    SetCommand(String),
}

impl fmt::Display for ContainerEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddPort(p) => write!(f, "add port {}", p),
            Self::RemovePort(p) => write!(f, "remove port {}", p),
            Self::ReplacePort { from, to } => write!(f, "port {} -> {}", from, to),
            Self::AddVolume(v) => write!(f, "add volume {}", v),
            Self::RemoveVolume(v) => write!(f, "remove volume {}", v),
            Self::ReplaceVolume { from, to } => write!(f, "volume {} -> {}", from, to),
            Self::AddEnv(e) => write!(f, "add env {}", e),
            Self::RemoveEnv(e) => write!(f, "remove env {}", e),
            Self::ReplaceEnv { from, to } => write!(f, "env {} -> {}", from, to),
            Self::SetCommand(c) => write!(f, "command '{}'", c),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detail() -> ContainerDetail {
        ContainerDetail {
            id: "abc123".to_string(),
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            status: ContainerStatus::Running,
            ports: MappingSet::new(),
            volumes: MappingSet::new(),
            env: MappingSet::new(),
            command: String::new(),
            restart_policy: None,
        }
    }

    #[test]
    fn test_apply_leaves_original_untouched() {
        let before = detail();
        let after = before
            .apply(&ContainerEdit::AddPort(PortMapping::new("8080", "80")))
            .unwrap();
        assert!(before.ports.is_empty());
        assert_eq!(after.ports.encoded(), vec!["8080:80"]);
    }

    #[test]
    fn test_apply_all_stops_at_stale_pair() {
        let edits = vec![
            ContainerEdit::AddEnv(EnvVar::new("A", "1")),
            ContainerEdit::RemoveEnv(EnvVar::new("B", "2")),
        ];
        let err = detail().apply_all(&edits).unwrap_err();
        assert_eq!(err.to_string(), "Env B=2 not found.");
    }

    #[test]
    fn test_set_command_trims() {
        let after = detail()
            .apply(&ContainerEdit::SetCommand(" npm start ".to_string()))
            .unwrap();
        assert_eq!(after.command, "npm start");
    }

    #[test]
    fn test_edit_display() {
        let edit = ContainerEdit::ReplaceVolume {
            from: VolumeMapping::new("/a", "/data"),
            to: VolumeMapping::new("/b", "/data"),
        };
        assert_eq!(edit.to_string(), "volume /a:/data -> /b:/data");
    }
}
