//! Docker operations bound to one host.
//!
//! [`DockerApi`] owns an executor and forwards to the inventory and
//! lifecycle layers, so callers holding a session do not pass it around.

use super::command::{DEFAULT_LOG_TAIL, PruneScope, RunOptions};
use super::container::{ContainerRecord, ContainerSummary};
use super::detail::{ContainerDetail, ContainerEdit};
use super::error::DockerError;
use super::image::{ImageRef, ImageSummary};
use super::inventory::{ComposeSupport, ContainerInventory, DockerAvailability};
use super::lifecycle::{BuildReport, BuildRequest, ContainerLifecycle, PullMode, PullOutcome};
use super::runtime::{ContainerStats, HealthReport, LogLine, NetworkSummary};
use crate::remote::{BackgroundJob, RemoteExecutor};

/// Default remote directory for uploaded build contexts.
pub const DEFAULT_STAGING_DIR: &str = "/tmp";

/// How many rows `diagnose` prints per listing.
const DIAGNOSE_PREVIEW: usize = 5;

/// Docker operations over one executor.
pub struct DockerApi<E: RemoteExecutor> {
    exec: E,
    staging_dir: String,
}

impl<E: RemoteExecutor> DockerApi<E> {
    #[must_use]
    pub fn new(exec: E) -> Self {
        Self {
            exec,
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
        }
    }

    /// Uses `dir` for uploaded build contexts.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<String>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    #[must_use]
    pub fn staging_dir(&self) -> &str {
        &self.staging_dir
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    #[must_use]
    pub fn into_inner(self) -> E {
        self.exec
    }

    // --- Inventory ---

    /// # Errors
    /// See [`ContainerInventory::list_summaries`].
    pub fn list_containers(&mut self) -> Result<Vec<ContainerSummary>, DockerError> {
        ContainerInventory::list_summaries(&mut self.exec)
    }

    /// # Errors
    /// See [`ContainerInventory::list_images`].
    pub fn list_images(&mut self) -> Result<Vec<ImageSummary>, DockerError> {
        ContainerInventory::list_images(&mut self.exec)
    }

    /// # Errors
    /// See [`ContainerInventory::list_networks`].
    pub fn list_networks(&mut self) -> Result<Vec<NetworkSummary>, DockerError> {
        ContainerInventory::list_networks(&mut self.exec)
    }

    /// # Errors
    /// See [`ContainerInventory::find_container`].
    pub fn find_container(&mut self, filter: &str) -> Result<Option<ContainerSummary>, DockerError> {
        ContainerInventory::find_container(&mut self.exec, filter)
    }

    /// # Errors
    /// Returns `NotFound` for an unknown container.
    pub fn inspect(&mut self, id: &str) -> Result<ContainerDetail, DockerError> {
        ContainerInventory::inspect(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `NotFound` for an unknown image.
    pub fn inspect_image(&mut self, reference: &str) -> Result<ImageRef, DockerError> {
        ContainerInventory::inspect_image(&mut self.exec, reference)
    }

    /// # Errors
    /// Returns transport errors only.
    pub fn availability(&mut self) -> Result<DockerAvailability, DockerError> {
        ContainerInventory::daemon_availability(&mut self.exec)
    }

    /// # Errors
    /// Returns transport errors only.
    pub fn compose_support(&mut self) -> Result<ComposeSupport, DockerError> {
        ContainerInventory::compose_support(&mut self.exec)
    }

    /// Unhydrated record for `id`; nothing is fetched until it is read.
    #[must_use]
    pub fn record(&self, id: &str) -> ContainerRecord {
        ContainerRecord::new(id)
    }

    // --- Editing ---

    /// Inspects `id` and returns the result of applying `edits` in order.
    /// The host is not touched; pass the result to [`commit`](Self::commit).
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown container and `StaleReference` for
    /// a removal or replacement of an absent pair.
    pub fn edit(&mut self, id: &str, edits: &[ContainerEdit]) -> Result<ContainerDetail, DockerError> {
        self.inspect(id)?.apply_all(edits)
    }

    /// Recreates `desired.id` from `desired`, keeping an `always` restart
    /// policy. Not atomic; see [`ContainerLifecycle::commit`].
    ///
    /// # Errors
    /// Returns the create step's error.
    pub fn commit(&mut self, desired: &ContainerDetail) -> Result<String, DockerError> {
        ContainerLifecycle::commit(&mut self.exec, desired, &RunOptions::preserving(desired))
    }

    /// Like [`commit`](Self::commit) with explicit run options.
    ///
    /// # Errors
    /// Returns the create step's error.
    pub fn commit_with(&mut self, desired: &ContainerDetail, options: &RunOptions) -> Result<String, DockerError> {
        ContainerLifecycle::commit(&mut self.exec, desired, options)
    }

    /// Recreates the container behind `record` with its in-memory edits.
    ///
    /// # Errors
    /// Returns an error if the record cannot be read or the create fails.
    pub fn recreate(&mut self, record: &mut ContainerRecord, options: &RunOptions) -> Result<String, DockerError> {
        ContainerLifecycle::recreate(&mut self.exec, record, options)
    }

    // --- Lifecycle ---

    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn start(&mut self, id: &str) -> Result<String, DockerError> {
        ContainerLifecycle::start(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn stop(&mut self, id: &str) -> Result<String, DockerError> {
        ContainerLifecycle::stop(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn restart(&mut self, id: &str) -> Result<String, DockerError> {
        ContainerLifecycle::restart(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `CommandFailed` if the removal is refused.
    pub fn delete(&mut self, id: &str, force: bool) -> Result<String, DockerError> {
        ContainerLifecycle::delete(&mut self.exec, id, force)
    }

    /// # Errors
    /// Returns an error if the pull cannot be launched or run.
    pub fn pull_image(&mut self, reference: &str, sync: bool) -> Result<PullOutcome, DockerError> {
        let mode = if sync { PullMode::Sync } else { PullMode::Background };
        ContainerLifecycle::pull_image(&mut self.exec, reference, mode)
    }

    /// # Errors
    /// Returns an error if the context cannot be packed or uploaded.
    pub fn build_image(&mut self, request: &BuildRequest) -> Result<BuildReport, DockerError> {
        ContainerLifecycle::build_image(&mut self.exec, &self.staging_dir, request)
    }

    // --- Runtime ---

    /// # Errors
    /// Returns `NotFound` for an unknown container.
    pub fn logs(&mut self, id: &str, tail: Option<usize>) -> Result<Vec<LogLine>, DockerError> {
        ContainerLifecycle::logs(&mut self.exec, id, tail.unwrap_or(DEFAULT_LOG_TAIL))
    }

    /// # Errors
    /// Returns an error if the launch fails.
    pub fn follow_logs(&mut self, id: &str) -> Result<BackgroundJob, DockerError> {
        ContainerLifecycle::follow_logs(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `NotFound` for an unknown container.
    pub fn stats(&mut self, id: &str) -> Result<ContainerStats, DockerError> {
        ContainerLifecycle::stats(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `NotFound` for an unknown container.
    pub fn health(&mut self, id: &str) -> Result<Option<HealthReport>, DockerError> {
        ContainerLifecycle::health(&mut self.exec, id)
    }

    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn prune(&mut self, scope: PruneScope) -> Result<String, DockerError> {
        ContainerLifecycle::prune(&mut self.exec, scope)
    }

    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn create_network(&mut self, name: &str, driver: &str) -> Result<String, DockerError> {
        ContainerLifecycle::create_network(&mut self.exec, name, driver)
    }

    /// # Errors
    /// Returns `CommandFailed` if compose is not installed.
    pub fn compose_up(&mut self, dir: &str, file: &str) -> Result<BackgroundJob, DockerError> {
        ContainerLifecycle::compose_up(&mut self.exec, dir, file)
    }

    /// # Errors
    /// Returns `CommandFailed` if compose is not installed or refuses.
    pub fn compose_down(&mut self, dir: &str, file: &str) -> Result<String, DockerError> {
        ContainerLifecycle::compose_down(&mut self.exec, dir, file)
    }

    /// Checks the daemon, compose and listings, one report line per step.
    /// Stops early when the daemon is unusable.
    pub fn diagnose(&mut self) -> Vec<String> {
        let mut results = Vec::new();

        results.push("[1] Docker availability...".to_string());
        match self.availability() {
            Ok(DockerAvailability::Available) => results.push("    ✓ Docker daemon is available".to_string()),
            Ok(other) => {
                let reason = other.error_message().unwrap_or_else(|| "unknown state".to_string());
                results.push(format!("    ✗ {}", reason));
                return results;
            }
            Err(e) => {
                results.push(format!("    ✗ {}", e));
                return results;
            }
        }
        if self.exec.is_elevated() {
            results.push("    → commands run through sudo".to_string());
        }

        results.push("[2] Docker Compose...".to_string());
        match self.compose_support() {
            Ok(support) => match support.binary() {
                Some(binary) => results.push(format!("    ✓ {}", binary)),
                None => results.push("    ✗ not installed".to_string()),
            },
            Err(e) => results.push(format!("    ✗ {}", e)),
        }

        results.push("[3] Containers...".to_string());
        match self.list_containers() {
            Ok(containers) => {
                results.push(format!("    ✓ Found {} containers", containers.len()));
                for c in containers.iter().take(DIAGNOSE_PREVIEW) {
                    results.push(format!("      - {} ({}) [{}]", c.name, c.image, c.status));
                }
                if containers.len() > DIAGNOSE_PREVIEW {
                    results.push(format!("      ... and {} more", containers.len() - DIAGNOSE_PREVIEW));
                }
            }
            Err(e) => results.push(format!("    ✗ {}", e)),
        }

        results.push("[4] Images...".to_string());
        match self.list_images() {
            Ok(images) => {
                results.push(format!("    ✓ Found {} images", images.len()));
                for img in images.iter().take(DIAGNOSE_PREVIEW) {
                    results.push(format!("      - {}", img.full_name()));
                }
                if images.len() > DIAGNOSE_PREVIEW {
                    results.push(format!("      ... and {} more", images.len() - DIAGNOSE_PREVIEW));
                }
            }
            Err(e) => results.push(format!("    ✗ {}", e)),
        }

        results
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::testing::ScriptedExecutor;

    #[test]
    fn test_diagnose_stops_when_daemon_down() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker version", "Cannot connect to the Docker daemon at unix:///var/run/docker.sock.");
        let mut api = DockerApi::new(exec);
        let report = api.diagnose();
        assert!(report.iter().any(|l| l.contains("not running")));
        assert!(!report.iter().any(|l| l.contains("[3]")));
    }

    #[test]
    fn test_diagnose_lists_containers() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker version", "24.0.7")
            .respond("docker compose version", "Docker Compose version v2.24.5")
            .respond("docker ps", "abc123\tweb\tnginx\tUp 2 hours\t\t\n");
        let mut api = DockerApi::new(exec);
        let report = api.diagnose().join("\n");
        assert!(report.contains("✓ docker compose"));
        assert!(report.contains("Found 1 containers"));
        assert!(report.contains("web (nginx) [RUNNING]"));
    }

    #[test]
    fn test_staging_dir() {
        let api = DockerApi::new(ScriptedExecutor::new()).with_staging_dir("/srv/stage");
        assert_eq!(api.staging_dir(), "/srv/stage");
    }
}
