//! The command execution seam.

use std::path::Path;

use tracing::{debug, warn};

use super::RemoteError;
use super::shell;
use crate::sentinel::{self, Sentinel};

/// File name of the log a detached command writes to.
pub const BACKGROUND_LOG_NAME: &str = "bg_command.log";

/// Output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Merged stdout and stderr, byte-faithful apart from sudo prompts.
    pub text: String,
    /// Remote exit status, when the server reported one.
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    /// Creates an output.
    #[must_use]
    pub fn new(text: impl Into<String>, exit_status: Option<i32>) -> Self {
        Self {
            text: text.into(),
            exit_status,
        }
    }

    /// Returns true if the remote process reported status 0.
    #[must_use]
    pub fn exited_cleanly(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Handle to a command launched in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJob {
    /// Remote PID, when the shell echoed one.
    pub pid: Option<u32>,
    /// Remote file collecting the job's output.
    pub log_path: String,
    /// Command as requested by the caller.
    pub command: String,
}

impl BackgroundJob {
    /// Builds a job handle from the launcher's output, which ends with the
    /// PID echoed by `$!`.
    #[must_use]
    pub fn from_launch_output(command: &str, log_path: &str, output: &str) -> Self {
        let pid = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| line.parse().ok());

        Self {
            pid,
            log_path: log_path.to_string(),
            command: command.to_string(),
        }
    }
}

/// Executes shell commands on one remote host.
///
/// Implementors supply the transport primitives; the provided methods layer
/// the elevation retry and the display/raw/detached execution modes on top.
/// Calls are serialized by `&mut self`: a second command cannot start before
/// the first one's output is drained.
pub trait RemoteExecutor {
    /// Runs `command` and waits for it, elevated if requested.
    fn exec(&mut self, command: &str, elevated: bool) -> Result<CommandOutput, RemoteError>;

    /// Launches `command` detached from the shell, its output going to
    /// `log_path`, and returns without waiting.
    fn spawn_detached(
        &mut self,
        command: &str,
        log_path: &str,
        elevated: bool,
    ) -> Result<BackgroundJob, RemoteError>;

    /// Copies a local file to `remote_path`.
    fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), RemoteError>;

    /// Copies `remote_path` to a local file and returns the byte count.
    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError>;

    /// Returns true if commands currently run elevated.
    fn is_elevated(&self) -> bool;

    /// Switches elevation mode.
    fn set_elevated(&mut self, elevated: bool);

    /// Remote directory for background job logs.
    fn background_log_dir(&self) -> &str {
        "/tmp"
    }

    /// Runs `command` and returns its output unmodified.
    ///
    /// If an unelevated attempt reports "permission denied", the command is
    /// retried once elevated and the session stays elevated afterwards.
    ///
    /// # Errors
    /// Returns `PermissionDenied` if the elevated attempt is denied too, or
    /// any transport error.
    fn run_raw(&mut self, command: &str) -> Result<CommandOutput, RemoteError> {
        let elevated = self.is_elevated();
        debug!("run: {} (elevated: {})", command, elevated);

        let output = self.exec(command, elevated)?;
        if !sentinel::matches(Sentinel::PermissionDenied, &output.text) {
            return Ok(output);
        }

        if !elevated {
            warn!("Permission denied, retrying elevated: {}", command);
            let retry = self.exec(command, true)?;
            if !sentinel::matches(Sentinel::PermissionDenied, &retry.text) {
                self.set_elevated(true);
                return Ok(retry);
            }
            return Err(RemoteError::PermissionDenied {
                command: command.to_string(),
                output: retry.text,
            });
        }

        Err(RemoteError::PermissionDenied {
            command: command.to_string(),
            output: output.text,
        })
    }

    /// Runs `command` and returns its output in display form.
    ///
    /// # Errors
    /// Same as [`run_raw`](Self::run_raw).
    fn run(&mut self, command: &str) -> Result<String, RemoteError> {
        let output = self.run_raw(command)?;
        Ok(shell::to_display(&output.text))
    }

    /// Runs `command` without permission sniffing, for output that may
    /// legitimately contain the phrase (container logs).
    ///
    /// # Errors
    /// Returns any transport error.
    fn run_unchecked(&mut self, command: &str) -> Result<CommandOutput, RemoteError> {
        let elevated = self.is_elevated();
        self.exec(command, elevated)
    }

    /// Launches `command` in the background and returns its PID.
    ///
    /// # Errors
    /// Returns an error only if the launch itself fails.
    fn run_detached(&mut self, command: &str) -> Result<BackgroundJob, RemoteError> {
        let log_path = format!(
            "{}/{}",
            self.background_log_dir().trim_end_matches('/'),
            BACKGROUND_LOG_NAME
        );
        let elevated = self.is_elevated();
        debug!("run detached: {} (elevated: {})", command, elevated);
        self.spawn_detached(command, &log_path, elevated)
    }

    /// Returns true if `path` exists on the remote host.
    ///
    /// # Errors
    /// Returns any transport error.
    fn path_exists(&mut self, path: &str) -> Result<bool, RemoteError> {
        let command = format!("test -e {} && echo yes || echo no", shell::quote(path));
        let output = self.run_raw(&command)?;
        Ok(output.text.trim_end().ends_with("yes"))
    }

    /// Creates `path` and its parents on the remote host.
    ///
    /// # Errors
    /// Returns any transport error.
    fn create_directory(&mut self, path: &str) -> Result<(), RemoteError> {
        let command = format!("mkdir -p {}", shell::quote(path));
        self.run_raw(&command)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_launch_output() {
        let job = BackgroundJob::from_launch_output("docker pull nginx", "/tmp/x.log", "4242\n");
        assert_eq!(job.pid, Some(4242));
        assert_eq!(job.log_path, "/tmp/x.log");
    }

    #[test]
    fn test_job_without_pid() {
        let job = BackgroundJob::from_launch_output("docker pull nginx", "/tmp/x.log", "oops");
        assert_eq!(job.pid, None);
    }

    #[test]
    fn test_exited_cleanly() {
        assert!(CommandOutput::new("", Some(0)).exited_cleanly());
        assert!(!CommandOutput::new("", Some(1)).exited_cleanly());
        assert!(!CommandOutput::new("", None).exited_cleanly());
    }
}
