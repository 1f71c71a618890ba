//! Integration tests for the executor contract.
//!
//! These tests verify:
//! - Elevation fallback on "permission denied"
//! - Raw and display execution modes
//! - Detached launches and their log files

#![allow(clippy::unwrap_used, clippy::expect_used)]

use dockhand::docker::{ContainerInventory, DockerError, ErrorKind};
use dockhand::remote::testing::ScriptedExecutor;
use dockhand::remote::{BACKGROUND_LOG_NAME, CommandOutput, RemoteError, RemoteExecutor};
use dockhand::sentinel::{self, Sentinel};

const DENIED: &str = "Got permission denied while trying to connect to the Docker daemon socket at \
                      unix:///var/run/docker.sock";

// ============================================================================
// Elevation Tests
// ============================================================================

mod elevation_tests {
    use super::*;

    #[test]
    fn test_denied_command_is_retried_elevated() {
        let mut exec = ScriptedExecutor::new();
        exec.respond_unelevated("docker ps -a", DENIED);
        exec.respond_elevated("docker ps -a", "abc123\tweb\tnginx\tUp 1 hour");

        let output = exec.run("docker ps -a").unwrap();
        assert_eq!(output, "abc123\tweb\tnginx\tUp 1 hour");
        assert!(!output.contains("permission denied"));

        let journal = exec.journal();
        assert_eq!(journal.len(), 2);
        assert!(!journal[0].elevated);
        assert!(journal[1].elevated);
    }

    #[test]
    fn test_session_stays_elevated_after_retry() {
        let mut exec = ScriptedExecutor::new();
        exec.respond_unelevated("docker", DENIED);
        exec.respond_elevated("docker", "ok");

        exec.run_raw("docker ps -a").unwrap();
        assert!(exec.is_elevated());

        exec.run_raw("docker images").unwrap();
        assert_eq!(exec.journal().len(), 3);
        assert!(exec.journal()[2].elevated);
    }

    #[test]
    fn test_denied_twice_is_permission_error() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker ps", DENIED);

        let err = exec.run_raw("docker ps -a").unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied { .. }));
        assert_eq!(exec.journal().len(), 2);
        assert!(!exec.is_elevated());
    }

    #[test]
    fn test_inventory_surfaces_permission_kind() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker ps", DENIED);

        let err = ContainerInventory::list_summaries(&mut exec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_inventory_lists_after_elevation() {
        let mut exec = ScriptedExecutor::new();
        exec.respond_unelevated("docker ps", DENIED);
        exec.respond_elevated("docker ps", "abc123\tweb\tnginx\tUp 1 hour\t\t\n");

        let rows = ContainerInventory::list_summaries(&mut exec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "web");
    }

    #[test]
    fn test_unchecked_run_keeps_denied_text() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker logs", "app: permission denied opening /data/x");

        let output = exec.run_unchecked("docker logs --tail=100 'abc'").unwrap();
        assert!(output.text.contains("permission denied"));
        assert_eq!(exec.journal().len(), 1);
    }
}

// ============================================================================
// Output Mode Tests
// ============================================================================

mod output_mode_tests {
    use super::*;

    #[test]
    fn test_raw_keeps_json_intact() {
        let json = "[\n  {\"Id\": \"abc\"}\n]\n";
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", json);
        assert_eq!(exec.run_raw("docker inspect abc").unwrap().text, json);
    }

    #[test]
    fn test_display_marks_line_breaks() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker stop", "abc\ndone");
        let display = exec.run("docker stop abc").unwrap();
        assert_eq!(display, "abc<br />\ndone");
    }

    #[test]
    fn test_exit_status_exposed() {
        let mut exec = ScriptedExecutor::new();
        exec.respond_with("false", CommandOutput::new("", Some(1)));
        let output = exec.run_raw("false").unwrap();
        assert_eq!(output.exit_status, Some(1));
        assert!(!output.exited_cleanly());
    }

    #[test]
    fn test_transport_failure_is_connection_kind() {
        let mut exec = ScriptedExecutor::new();
        exec.fail("docker ps", "connection reset");
        let err: DockerError = ContainerInventory::list_summaries(&mut exec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}

// ============================================================================
// Detached Execution Tests
// ============================================================================

mod detached_tests {
    use super::*;

    #[test]
    fn test_detached_returns_pid_and_log() {
        let mut exec = ScriptedExecutor::new();
        let job = exec.run_detached("docker pull nginx").unwrap();
        assert!(job.pid.is_some());
        assert_eq!(job.log_path, format!("/tmp/{}", BACKGROUND_LOG_NAME));
        assert!(exec.journal()[0].detached);
    }

    #[test]
    fn test_path_helpers() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("test -e", "yes");
        assert!(exec.path_exists("/srv/app").unwrap());
        exec.create_directory("/srv/app/data").unwrap();
        assert_eq!(exec.last_matching("mkdir"), Some("mkdir -p '/srv/app/data'"));
    }
}

// ============================================================================
// Sentinel Tests
// ============================================================================

mod sentinel_tests {
    use super::*;

    #[test]
    fn test_build_output_classified() {
        let output = "Step 5/5 : CMD [\"./run\"]\nSuccessfully built 0123abcd\nSuccessfully tagged api:latest";
        assert!(sentinel::matches(Sentinel::BuildSucceeded, output));
        assert!(!sentinel::matches(Sentinel::DaemonError, output));
    }

    #[test]
    fn test_buildkit_output_classified() {
        let output = "#8 writing image sha256:0123 done\n#8 naming to docker.io/library/api:latest done";
        assert!(sentinel::matches(Sentinel::BuildSucceeded, output));
    }
}
