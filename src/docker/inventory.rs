//! Reading containers, images and networks from a host.

use tracing::{debug, info};

use super::command;
use super::container::{ContainerRecord, ContainerSummary};
use super::detail::ContainerDetail;
use super::document::InspectDocument;
use super::error::{DockerError, excerpt};
use super::image::{ImageRef, ImageSummary};
use super::parse;
use super::runtime::NetworkSummary;
use crate::remote::{CommandOutput, RemoteExecutor};
use crate::sentinel::{self, Sentinel};

/// Docker availability on a host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DockerAvailability {
    /// Not checked yet.
    #[default]
    Unknown,
    /// The CLI is not installed.
    NotInstalled,
    /// The CLI is installed but the daemon is not running.
    NotRunning,
    /// The daemon answered with an error.
    DaemonError(String),
    /// Ready to use.
    Available,
}

impl DockerAvailability {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Human-readable problem, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Unknown | Self::Available => None,
            Self::NotInstalled => Some("Docker is not installed".to_string()),
            Self::NotRunning => Some("Docker daemon is not running".to_string()),
            Self::DaemonError(msg) => Some(format!("Docker error: {}", msg)),
        }
    }
}

/// Which compose front end a host offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeSupport {
    /// `docker compose`.
    Plugin,
    /// `docker-compose`.
    Standalone,
    None,
}

impl ComposeSupport {
    /// Binary to invoke, if any.
    #[must_use]
    pub fn binary(&self) -> Option<&'static str> {
        match self {
            Self::Plugin => Some("docker compose"),
            Self::Standalone => Some("docker-compose"),
            Self::None => None,
        }
    }
}

/// Read-only queries against one host's daemon.
pub struct ContainerInventory;

impl ContainerInventory {
    /// Lists all containers, running or not.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon is unreachable, or any
    /// transport error.
    pub fn list_summaries<E>(exec: &mut E) -> Result<Vec<ContainerSummary>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = Self::run_listing(exec, command::LIST_CONTAINERS)?;
        let containers = parse::parse_container_listing(&output.text);
        debug!("Listed {} containers", containers.len());
        Ok(containers)
    }

    /// Lists all containers as records pre-filled from the listing.
    ///
    /// # Errors
    /// Same as [`list_summaries`](Self::list_summaries).
    pub fn list_containers<E>(exec: &mut E) -> Result<Vec<ContainerRecord>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        Ok(Self::list_summaries(exec)?
            .into_iter()
            .map(ContainerRecord::from_summary)
            .collect())
    }

    /// Lists images.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon is unreachable, or any
    /// transport error.
    pub fn list_images<E>(exec: &mut E) -> Result<Vec<ImageSummary>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = Self::run_listing(exec, command::LIST_IMAGES)?;
        Ok(parse::parse_image_listing(&output.text))
    }

    /// Lists networks.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon is unreachable, or any
    /// transport error.
    pub fn list_networks<E>(exec: &mut E) -> Result<Vec<NetworkSummary>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = Self::run_listing(exec, command::LIST_NETWORKS)?;
        Ok(parse::parse_network_listing(&output.text))
    }

    fn run_listing<E>(exec: &mut E, listing: &str) -> Result<CommandOutput, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_raw(listing)?;
        if sentinel::matches(Sentinel::DaemonUnreachable, &output.text)
            || sentinel::matches(Sentinel::CliMissing, &output.text)
        {
            return Err(DockerError::CommandFailed {
                command: listing.to_string(),
                output: excerpt(&output.text),
                exit_status: output.exit_status,
            });
        }
        Ok(output)
    }

    /// First container whose ID starts with `filter` or whose name equals it.
    ///
    /// # Errors
    /// Same as [`list_summaries`](Self::list_summaries).
    pub fn find_container<E>(exec: &mut E, filter: &str) -> Result<Option<ContainerSummary>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        assert!(!filter.is_empty(), "filter must not be empty");
        Ok(Self::list_summaries(exec)?
            .into_iter()
            .find(|c| c.id.starts_with(filter) || c.name == filter))
    }

    /// Runs `docker inspect` for one container.
    ///
    /// # Errors
    /// Returns `NotFound` for a missing container and `MalformedOutput` for
    /// undecodable output.
    pub fn inspect_document<E>(exec: &mut E, id: &str) -> Result<InspectDocument, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        assert!(!id.is_empty(), "id must not be empty");
        let output = exec.run_raw(&command::inspect_container(id))?;
        parse::parse_inspect(&output.text, "Container", id)
    }

    /// Reads the full configuration of a container.
    ///
    /// # Errors
    /// Same as [`inspect_document`](Self::inspect_document).
    pub fn inspect<E>(exec: &mut E, id: &str) -> Result<ContainerDetail, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let mut record = ContainerRecord::new(id);
        record.inspect(exec)?;
        record.snapshot(exec)
    }

    /// Runs `docker image inspect` for a reference.
    ///
    /// # Errors
    /// Returns `NotFound` for a missing image.
    pub fn inspect_image<E>(exec: &mut E, reference: &str) -> Result<ImageRef, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        assert!(!reference.is_empty(), "reference must not be empty");
        let output = exec.run_raw(&command::inspect_image(reference))?;
        let document = parse::parse_inspect(&output.text, "Image", reference)?;
        Ok(ImageRef::from_document(&document, reference))
    }

    /// Checks whether the CLI and daemon are usable.
    ///
    /// # Errors
    /// Returns transport errors only.
    pub fn daemon_availability<E>(exec: &mut E) -> Result<DockerAvailability, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_raw(command::DAEMON_VERSION)?;
        let text = output.text.trim();

        let availability = if sentinel::matches(Sentinel::CliMissing, text) {
            DockerAvailability::NotInstalled
        } else if sentinel::matches(Sentinel::DaemonUnreachable, text) {
            DockerAvailability::NotRunning
        } else if sentinel::matches(Sentinel::DaemonError, text)
            || output.exit_status.is_some_and(|s| s != 0)
        {
            DockerAvailability::DaemonError(excerpt(text))
        } else {
            DockerAvailability::Available
        };

        info!("Docker availability: {:?}", availability);
        Ok(availability)
    }

    /// Detects the compose front end.
    ///
    /// # Errors
    /// Returns transport errors only.
    pub fn compose_support<E>(exec: &mut E) -> Result<ComposeSupport, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let plugin = exec.run_raw(command::COMPOSE_PLUGIN_VERSION)?;
        if plugin.text.contains("Docker Compose version") {
            return Ok(ComposeSupport::Plugin);
        }

        let standalone = exec.run_raw(command::COMPOSE_STANDALONE_VERSION)?;
        if standalone.text.contains("docker-compose version")
            || standalone.text.contains("Docker Compose version")
        {
            return Ok(ComposeSupport::Standalone);
        }

        Ok(ComposeSupport::None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::docker::error::ErrorKind;
    use crate::remote::testing::ScriptedExecutor;

    #[test]
    fn test_unreachable_daemon_is_an_error() {
        let mut exec = ScriptedExecutor::new();
        exec.respond(
            "docker ps",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
        );
        let err = ContainerInventory::list_summaries(&mut exec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandFailed);
    }

    #[test]
    fn test_find_container_by_prefix_or_name() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker ps", "abc123\tweb\tnginx\tUp 1 hour\t\t\ndef456\tdb\tpostgres\tUp 1 hour\t\t\n");
        let by_id = ContainerInventory::find_container(&mut exec, "def").unwrap();
        assert_eq!(by_id.map(|c| c.name), Some("db".to_string()));
        let by_name = ContainerInventory::find_container(&mut exec, "web").unwrap();
        assert_eq!(by_name.map(|c| c.id), Some("abc123".to_string()));
        assert!(ContainerInventory::find_container(&mut exec, "zzz").unwrap().is_none());
    }

    #[test]
    fn test_availability() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker version", "24.0.7\n");
        assert!(ContainerInventory::daemon_availability(&mut exec).unwrap().is_available());

        exec.respond("docker version", "bash: docker: command not found");
        assert_eq!(
            ContainerInventory::daemon_availability(&mut exec).unwrap(),
            DockerAvailability::NotInstalled
        );
    }

    #[test]
    fn test_compose_support() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker compose version", "docker: 'compose' is not a docker command.")
            .respond("docker-compose --version", "docker-compose version 1.29.2, build 5becea4c");
        assert_eq!(
            ContainerInventory::compose_support(&mut exec).unwrap(),
            ComposeSupport::Standalone
        );
    }

    #[test]
    fn test_inspect_image_falls_back_to_reference_fields() {
        let mut exec = ScriptedExecutor::new();
        exec.respond(
            "docker image inspect",
            r#"[{"Id":"sha256:1","RepoTags":["nginx:1.25"],"Size":42}]"#,
        );
        let image = ContainerInventory::inspect_image(&mut exec, "nginx:1.25").unwrap();
        assert_eq!(image.repo_with_tag(), "nginx:1.25");
        assert_eq!(image.size, Some(42));
    }
}
