//! Container state changes, recreation, builds and pulls.
//!
//! Failure of a command that runs is detected from its output through the
//! sentinel table; exit status is carried along in the error when the
//! transport reports one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};

use super::command::{self, PruneScope, RunOptions};
use super::container::ContainerRecord;
use super::detail::ContainerDetail;
use super::error::{DockerError, excerpt};
use super::inventory::{ComposeSupport, ContainerInventory};
use super::parse;
use super::runtime::{ContainerStats, HealthReport, LogLine};
use crate::remote::{BackgroundJob, CommandOutput, RemoteExecutor, shell};
use crate::sentinel::{self, Sentinel};

/// Dockerfile name expected at the root of a build context directory.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Fallback when neither the build output nor its log can be read.
const NO_LOG: &str = "No log available";

/// How an image pull is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// Detached; returns once the pull has been launched.
    #[default]
    Background,
    /// Blocks until the pull finishes.
    Sync,
}

/// Result of [`ContainerLifecycle::pull_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The pull runs on the host; its outcome is not observed.
    Launched(BackgroundJob),
    /// The pull finished.
    Completed {
        output: String,
        succeeded: bool,
    },
}

/// A local build context to send to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// A Dockerfile, or a directory with a `Dockerfile` at its root.
    pub source: PathBuf,
    /// Image name; derived from the source file name when `None`.
    pub image_name: Option<String>,
    pub build_args: BTreeMap<String, String>,
}

impl BuildRequest {
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            image_name: None,
            build_args: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.image_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Image name to tag: the explicit one, or the source file name up to
    /// its first `.`, lowercased.
    #[must_use]
    pub fn resolved_name(&self) -> String {
        if let Some(name) = self.image_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let file_name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_name.split('.').next().unwrap_or_default();
        if stem.is_empty() {
            "image".to_string()
        } else {
            stem.to_lowercase()
        }
    }
}

/// Outcome of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub image_name: String,
    /// Build output, or the error text and log when the build could not
    /// be run.
    pub output: String,
    pub succeeded: bool,
    /// Remote log file holding the build output.
    pub log_path: String,
}

/// Operations that change container or image state on one host.
pub struct ContainerLifecycle;

impl ContainerLifecycle {
    /// Runs `command` and fails if its output reports a daemon error.
    fn checked<E>(exec: &mut E, command: &str) -> Result<CommandOutput, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_raw(command)?;
        let failed = [
            Sentinel::DaemonError,
            Sentinel::RunRejected,
            Sentinel::DaemonUnreachable,
            Sentinel::CliMissing,
        ]
        .into_iter()
        .any(|s| sentinel::matches(s, &output.text));

        if failed {
            return Err(DockerError::CommandFailed {
                command: command.to_string(),
                output: excerpt(&output.text),
                exit_status: output.exit_status,
            });
        }
        Ok(output)
    }

    fn checked_display<E>(exec: &mut E, command: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = Self::checked(exec, command)?;
        Ok(shell::to_display(&output.text))
    }

    /// Starts a container.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn start<E>(exec: &mut E, id: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        info!("Starting container {}", id);
        Self::checked_display(exec, &command::start(id))
    }

    /// Stops a container.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn stop<E>(exec: &mut E, id: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        info!("Stopping container {}", id);
        Self::checked_display(exec, &command::stop(id))
    }

    /// Restarts a container.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn restart<E>(exec: &mut E, id: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        info!("Restarting container {}", id);
        Self::checked_display(exec, &command::restart(id))
    }

    /// Stops then removes a container. The stop may fail, for instance when
    /// the container is already stopped; that failure is ignored.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the removal is refused.
    pub fn delete<E>(exec: &mut E, id: &str, force: bool) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Err(e) = Self::stop(exec, id) {
            debug!("Stop before removal of {} failed: {}", id, e);
        }
        info!("Removing container {} (force: {})", id, force);
        Self::checked_display(exec, &command::remove(id, force))
    }

    /// Runs a new container from `detail`.
    ///
    /// # Errors
    /// Returns `CommandFailed` if `docker run` is rejected, for example on
    /// a name collision.
    pub fn create<E>(exec: &mut E, detail: &ContainerDetail, options: &RunOptions) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let run = command::run(detail, options);
        info!("Creating container {}: {}", detail.name, run);
        Self::checked_display(exec, &run)
    }

    /// Replaces the container `detail.id` with one built from `detail`.
    ///
    /// This is a delete followed by a create and is not atomic. A failed
    /// delete is logged and the create still runs; it then fails on the
    /// name collision. A failed create leaves the old container deleted and
    /// no new one, so callers should keep `detail` and may retry
    /// [`create`](Self::create) with it.
    ///
    /// # Errors
    /// Returns the create step's error.
    pub fn commit<E>(exec: &mut E, detail: &ContainerDetail, options: &RunOptions) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        info!("Recreating container {} ({})", detail.name, detail.id);
        if let Err(e) = Self::delete(exec, &detail.id, false) {
            warn!("Failed to delete container {} before recreating: {}", detail.id, e);
        }
        Self::create(exec, detail, options)
    }

    /// Recreates the container behind `record` with its in-memory edits.
    ///
    /// # Errors
    /// Returns an error if the record cannot be read or the create step
    /// fails.
    pub fn recreate<E>(exec: &mut E, record: &mut ContainerRecord, options: &RunOptions) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let detail = record.snapshot(exec)?;
        Self::commit(exec, &detail, options)
    }

    /// Sends a build context to the host and builds `name:latest` from it.
    ///
    /// A Dockerfile is uploaded into `staging_dir`. A directory is packed
    /// into a gzip tarball, uploaded and extracted there. Build output is
    /// teed to a log file under `staging_dir`; if the build command cannot
    /// be run, the report carries the error and that log instead.
    ///
    /// # Errors
    /// Returns an error if the context cannot be packed or uploaded.
    pub fn build_image<E>(exec: &mut E, staging_dir: &str, request: &BuildRequest) -> Result<BuildReport, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let image_name = request.resolved_name();
        let staging = staging_dir.trim_end_matches('/');
        let (dockerfile, context_dir) = Self::stage_context(exec, staging, &image_name, &request.source)?;
        let log_path = format!("{}/docker_build_{}.log", staging, image_name);

        let build = command::build(&dockerfile, &image_name, &request.build_args, &context_dir, &log_path);
        info!("Building image {} from {}", image_name, request.source.display());

        let (output, succeeded) = match exec.run_raw(&build) {
            Ok(output) => {
                let succeeded = sentinel::matches(Sentinel::BuildSucceeded, &output.text);
                (output.text, succeeded)
            }
            Err(e) => {
                warn!("Build of {} failed to run: {}", image_name, e);
                let text = match exec.run_unchecked(&command::read_log(&log_path)) {
                    Ok(log) => {
                        let log = if log.text.trim().is_empty() { NO_LOG.to_string() } else { log.text };
                        format!("Error building image: {}\nBuild log:\n{}", e, log)
                    }
                    Err(_) => format!("Error building image: {}", e),
                };
                (text, false)
            }
        };

        info!("Build of {} finished (succeeded: {})", image_name, succeeded);
        Ok(BuildReport {
            image_name,
            output,
            succeeded,
            log_path,
        })
    }

    /// Uploads the build context and returns the remote Dockerfile path and
    /// context directory.
    fn stage_context<E>(
        exec: &mut E,
        staging: &str,
        image_name: &str,
        source: &Path,
    ) -> Result<(String, String), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let metadata = fs::metadata(source)?;

        if metadata.is_file() {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| DOCKERFILE_NAME.to_string());
            let remote = format!("{}/{}", staging, file_name);
            exec.upload(source, &remote)?;
            return Ok((remote, staging.to_string()));
        }

        if !source.join(DOCKERFILE_NAME).is_file() {
            return Err(DockerError::Archive {
                path: source.display().to_string(),
                reason: format!("no {} at the context root", DOCKERFILE_NAME),
            });
        }

        let archive_name = format!("{}-context.tar.gz", image_name);
        let local_archive = std::env::temp_dir().join(&archive_name);
        pack_context(source, &local_archive)?;

        let remote_archive = format!("{}/{}", staging, archive_name);
        let context_dir = format!("{}/{}-context", staging, image_name);
        let uploaded = exec.upload(&local_archive, &remote_archive);
        if let Err(e) = fs::remove_file(&local_archive) {
            debug!("Could not remove {}: {}", local_archive.display(), e);
        }
        uploaded?;

        Self::checked(exec, &command::extract_archive(&remote_archive, &context_dir))?;
        Ok((format!("{}/{}", context_dir, DOCKERFILE_NAME), context_dir))
    }

    /// Pulls an image, in the background or synchronously.
    ///
    /// # Errors
    /// Returns an error if the pull cannot be launched or run.
    pub fn pull_image<E>(exec: &mut E, reference: &str, mode: PullMode) -> Result<PullOutcome, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        assert!(!reference.trim().is_empty(), "reference must not be empty");
        let pull = command::pull(reference);
        info!("Pulling {} ({:?})", reference, mode);

        match mode {
            PullMode::Background => Ok(PullOutcome::Launched(exec.run_detached(&pull)?)),
            PullMode::Sync => {
                let output = exec.run_raw(&pull)?;
                let succeeded = sentinel::matches(Sentinel::PullSucceeded, &output.text);
                Ok(PullOutcome::Completed {
                    output: output.text,
                    succeeded,
                })
            }
        }
    }

    /// Last `tail` lines of a container's output.
    ///
    /// # Errors
    /// Returns `NotFound` if the daemon does not know the container.
    pub fn logs<E>(exec: &mut E, id: &str, tail: usize) -> Result<Vec<LogLine>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_unchecked(&command::logs(id, tail))?;
        Self::ensure_found(&output.text, id)?;
        Ok(parse::parse_logs(&output.text))
    }

    /// Streams a container's output into a background log file.
    ///
    /// # Errors
    /// Returns an error if the launch fails.
    pub fn follow_logs<E>(exec: &mut E, id: &str) -> Result<BackgroundJob, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        Ok(exec.run_detached(&command::follow_logs(id))?)
    }

    /// One stats sample for a container.
    ///
    /// # Errors
    /// Returns `NotFound` if the daemon does not know the container, or
    /// `MalformedOutput` if no row could be read.
    pub fn stats<E>(exec: &mut E, id: &str) -> Result<ContainerStats, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_raw(&command::stats(id))?;
        Self::ensure_found(&output.text, id)?;
        parse::parse_stats(&output.text)
            .into_iter()
            .next()
            .ok_or_else(|| DockerError::malformed("stats", &output.text))
    }

    /// Health check state, or `None` when the container has no check.
    ///
    /// # Errors
    /// Returns `NotFound` if the daemon does not know the container.
    pub fn health<E>(exec: &mut E, id: &str) -> Result<Option<HealthReport>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let output = exec.run_raw(&command::health(id))?;
        Self::ensure_found(&output.text, id)?;
        parse::parse_health(&output.text)
    }

    fn ensure_found(text: &str, id: &str) -> Result<(), DockerError> {
        let head = text.trim_start();
        if sentinel::matches(Sentinel::DaemonErrorPrefix, head) && sentinel::matches(Sentinel::NoSuchObject, head) {
            return Err(DockerError::NotFound {
                what: "Container",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Removes stopped containers, unused networks and dangling images,
    /// plus whatever `scope` adds.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn prune<E>(exec: &mut E, scope: PruneScope) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        info!("Pruning ({:?})", scope);
        Self::checked_display(exec, &command::prune(scope))
    }

    /// Creates a network.
    ///
    /// # Errors
    /// Returns `CommandFailed` if the daemon refuses.
    pub fn create_network<E>(exec: &mut E, name: &str, driver: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        assert!(!name.trim().is_empty(), "network name must not be empty");
        let output = Self::checked(exec, &command::create_network(name, driver))?;
        Ok(output.text.trim().to_string())
    }

    /// Brings a compose project up in the background.
    ///
    /// # Errors
    /// Returns `CommandFailed` if no compose front end is installed.
    pub fn compose_up<E>(exec: &mut E, dir: &str, file: &str) -> Result<BackgroundJob, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let binary = Self::compose_binary(exec)?;
        let up = command::compose_up(binary, dir, file);
        info!("Compose up: {}", up);
        Ok(exec.run_detached(&up)?)
    }

    /// Takes a compose project down.
    ///
    /// # Errors
    /// Returns `CommandFailed` if no compose front end is installed or the
    /// command is refused.
    pub fn compose_down<E>(exec: &mut E, dir: &str, file: &str) -> Result<String, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let binary = Self::compose_binary(exec)?;
        let down = command::compose_down(binary, dir, file);
        info!("Compose down: {}", down);
        Self::checked_display(exec, &down)
    }

    fn compose_binary<E>(exec: &mut E) -> Result<&'static str, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let support = ContainerInventory::compose_support(exec)?;
        support.binary().ok_or_else(|| DockerError::CommandFailed {
            command: command::COMPOSE_PLUGIN_VERSION.to_string(),
            output: "Docker Compose is not supported on this server".to_string(),
            exit_status: None,
        })
    }
}

/// Packs `dir` into a gzip tarball at `archive` with paths relative to
/// `dir`.
///
/// # Errors
/// Returns `Archive` if any file cannot be read or written.
pub fn pack_context(dir: &Path, archive: &Path) -> Result<(), DockerError> {
    let fail = |reason: String| DockerError::Archive {
        path: dir.display().to_string(),
        reason,
    };

    let file = File::create(archive).map_err(|e| fail(format!("create: {e}")))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", dir)
        .map_err(|e| fail(format!("append: {e}")))?;
    let encoder = builder.into_inner().map_err(|e| fail(format!("finish tar: {e}")))?;
    encoder.finish().map_err(|e| fail(format!("finish gzip: {e}")))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::docker::error::ErrorKind;
    use crate::remote::testing::ScriptedExecutor;

    #[test]
    fn test_resolved_name() {
        assert_eq!(BuildRequest::new("/x/Api.Dockerfile").resolved_name(), "api");
        assert_eq!(BuildRequest::new("/x/web").with_name("shop").resolved_name(), "shop");
        assert_eq!(BuildRequest::new("/x/Dockerfile").resolved_name(), "dockerfile");
    }

    #[test]
    fn test_delete_ignores_failed_stop() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker stop", "Error response from daemon: container is not running");
        exec.respond("docker rm", "abc123");
        let out = ContainerLifecycle::delete(&mut exec, "abc123", false).unwrap();
        assert_eq!(out, "abc123");
        assert_eq!(exec.count_matching("docker rm"), 1);
    }

    #[test]
    fn test_start_reports_daemon_error() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker start", "Error response from daemon: No such container: nope");
        let err = ContainerLifecycle::start(&mut exec, "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandFailed);
    }

    #[test]
    fn test_sync_pull_success() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker pull", "latest: Pulling from library/nginx\nStatus: Image is up to date for nginx:latest");
        let outcome = ContainerLifecycle::pull_image(&mut exec, "nginx", PullMode::Sync).unwrap();
        assert!(matches!(outcome, PullOutcome::Completed { succeeded: true, .. }));
    }

    #[test]
    fn test_background_pull_is_detached() {
        let mut exec = ScriptedExecutor::new();
        let outcome = ContainerLifecycle::pull_image(&mut exec, "nginx:1.25", PullMode::Background).unwrap();
        match outcome {
            PullOutcome::Launched(job) => assert_eq!(job.command, "docker pull nginx:1.25"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(exec.journal()[0].detached);
    }

    #[test]
    fn test_health_without_check() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("json .State.Health", "null\n");
        assert!(ContainerLifecycle::health(&mut exec, "abc").unwrap().is_none());
    }

    #[test]
    fn test_health_of_missing_container() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("json .State.Health", "Error: No such object: abc");
        let err = ContainerLifecycle::health(&mut exec, "abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_compose_without_support() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("compose", "command not found");
        let err = ContainerLifecycle::compose_down(&mut exec, "/srv/app", "compose.yml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandFailed);
    }
}
