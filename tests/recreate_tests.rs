//! Integration tests for edit-by-recreate.
//!
//! These tests verify:
//! - The exact `docker run` command rebuilt from a container
//! - Flag order and stability across repeated recreates
//! - Delete failures are tolerated, create failures surface

#![allow(clippy::unwrap_used, clippy::expect_used)]

use dockhand::docker::{
    ContainerDetail, ContainerEdit, ContainerLifecycle, ContainerRecord, DockerApi, EnvVar, ErrorKind,
    PortMapping, RunOptions, VolumeMapping,
};
use dockhand::remote::testing::ScriptedExecutor;
use pretty_assertions::assert_eq;

const INSPECT_NO_PORTS: &str = r#"[{
  "Id": "abc123",
  "Name": "/web",
  "State": { "Status": "running" },
  "Config": { "Image": "nginx:latest", "Env": [], "Cmd": null },
  "HostConfig": { "PortBindings": {}, "RestartPolicy": { "Name": "no" } },
  "Mounts": []
}]"#;

const INSPECT_WITH_PORT: &str = r#"[{
  "Id": "fff999",
  "Name": "/web",
  "State": { "Status": "running" },
  "Config": { "Image": "nginx:latest", "Env": [], "Cmd": null },
  "HostConfig": {
    "PortBindings": { "80/tcp": [{ "HostIp": "", "HostPort": "8080" }] },
    "RestartPolicy": { "Name": "no" }
  },
  "Mounts": []
}]"#;

const INSPECT_FULL: &str = r#"[{
  "Id": "def456",
  "Name": "/api",
  "State": { "Status": "running" },
  "Config": {
    "Image": "registry.local:5000/api:2.1",
    "Env": ["DB_URL=postgres://db:5432/app?ssl=true", "MODE=prod"],
    "Cmd": ["./api", "--port", "3000"]
  },
  "HostConfig": {
    "PortBindings": {
      "3000/tcp": [{ "HostIp": "", "HostPort": "3000" }],
      "9100/tcp": [{ "HostIp": "", "HostPort": "9100" }]
    },
    "RestartPolicy": { "Name": "always" }
  },
  "Mounts": [
    { "Type": "bind", "Source": "/srv/api/data", "Destination": "/data" },
    { "Type": "volume", "Name": "api-cache", "Source": "/var/lib/docker/volumes/api-cache/_data", "Destination": "/cache" }
  ]
}]"#;

/// Flags and trailing words of a run command, without `--name`.
fn flag_pairs(run: &str) -> Vec<String> {
    let words: Vec<&str> = run.split_whitespace().collect();
    words
        .windows(2)
        .filter(|w| matches!(w[0], "-p" | "-v" | "-e"))
        .map(|w| format!("{} {}", w[0], w[1]))
        .collect()
}

// ============================================================================
// End-to-End Scenario
// ============================================================================

mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_port_then_recreate() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_NO_PORTS);

        let mut record = ContainerRecord::new("abc123");
        assert!(record.ports(&mut exec).unwrap().is_empty());
        record.add_port(&mut exec, PortMapping::new("8080", "80")).unwrap();

        ContainerLifecycle::recreate(&mut exec, &mut record, &RunOptions::default()).unwrap();

        let run = exec.last_matching("docker run").unwrap().to_string();
        assert_eq!(run.matches("-p ").count(), 1);
        assert!(run.contains("-p 8080:80"));
        assert_eq!(run, "docker run -d --name 'web' -p 8080:80 nginx:latest");

        // The old container is stopped and removed before the run.
        let commands = exec.commands();
        let rm = commands.iter().position(|c| c.contains("docker rm")).unwrap();
        let run_at = commands.iter().position(|c| c.contains("docker run")).unwrap();
        assert!(rm < run_at);

        // A later inspection shows the port on the new container.
        exec.respond("docker inspect", INSPECT_WITH_PORT);
        let mut fresh = ContainerRecord::new("fff999");
        assert_eq!(fresh.ports(&mut exec).unwrap().encoded(), vec!["8080:80"]);
    }

    #[test]
    fn test_edit_and_commit_through_api() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_NO_PORTS);
        let mut api = DockerApi::new(exec);

        let desired = api
            .edit("abc123", &[ContainerEdit::AddPort(PortMapping::new("8080", "80"))])
            .unwrap();
        api.commit(&desired).unwrap();

        let run = api.executor().last_matching("docker run").unwrap();
        assert_eq!(run, "docker run -d --name 'web' -p 8080:80 nginx:latest");
    }
}

// ============================================================================
// Command Construction Tests
// ============================================================================

mod command_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_detail() -> ContainerDetail {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_FULL);
        ContainerRecord::new("def456").snapshot(&mut exec).unwrap()
    }

    #[test]
    fn test_full_run_command() {
        let detail = full_detail();
        let mut exec = ScriptedExecutor::new();
        ContainerLifecycle::commit(&mut exec, &detail, &RunOptions::preserving(&detail)).unwrap();

        assert_eq!(
            exec.last_matching("docker run").unwrap(),
            "docker run -d --restart always --name 'api' -p 3000:3000 -p 9100:9100 \
             -v /srv/api/data:/data -v api-cache:/cache \
             -e 'DB_URL=postgres://db:5432/app?ssl=true' -e MODE=prod \
             registry.local:5000/api:2.1 ./api --port 3000"
        );
    }

    #[test]
    fn test_recreate_twice_renders_identical_flags() {
        let detail = full_detail();
        let mut exec = ScriptedExecutor::new();
        let options = RunOptions::preserving(&detail);

        ContainerLifecycle::commit(&mut exec, &detail, &options).unwrap();
        ContainerLifecycle::commit(&mut exec, &detail, &options).unwrap();

        let runs: Vec<String> = exec
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("docker run"))
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], runs[1]);
        assert_eq!(
            flag_pairs(&runs[0]),
            vec![
                "-p 3000:3000",
                "-p 9100:9100",
                "-v /srv/api/data:/data",
                "-v api-cache:/cache",
                "-e 'DB_URL=postgres://db:5432/app?ssl=true'",
                "-e MODE=prod",
            ]
        );
    }

    #[test]
    fn test_flags_follow_collection_order() {
        let mut detail = full_detail();
        detail = detail
            .apply_all(&[
                ContainerEdit::AddEnv(EnvVar::new("A", "1")),
                ContainerEdit::RemoveVolume(VolumeMapping::new("/srv/api/data", "/data")),
                ContainerEdit::AddVolume(VolumeMapping::new("/srv/api/data", "/data")),
            ])
            .unwrap();

        let pairs = flag_pairs(&dockhand::docker::command::run(&detail, &RunOptions::default()));
        assert_eq!(
            pairs,
            vec![
                "-p 3000:3000",
                "-p 9100:9100",
                "-v api-cache:/cache",
                "-v /srv/api/data:/data",
                "-e 'DB_URL=postgres://db:5432/app?ssl=true'",
                "-e MODE=prod",
                "-e A=1",
            ]
        );
    }

    #[test]
    fn test_health_check_flags() {
        let detail = full_detail();
        let options = RunOptions {
            restart_always: false,
            health_check: Some("curl -f http://localhost:3000/health".to_string()),
        };
        let run = dockhand::docker::command::run(&detail, &options);
        assert!(run.contains("--health-cmd='curl -f http://localhost:3000/health'"));
        assert!(run.contains("--health-retries=3"));
        assert!(!run.contains("--restart"));
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_failed_delete_still_creates() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_NO_PORTS);
        let detail = ContainerRecord::new("abc123").snapshot(&mut exec).unwrap();

        exec.fail("docker rm", "channel closed");
        ContainerLifecycle::commit(&mut exec, &detail, &RunOptions::default()).unwrap();
        assert_eq!(exec.count_matching("docker run"), 1);
    }

    #[test]
    fn test_failed_create_surfaces_and_keeps_descriptor_usable() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_NO_PORTS);
        let detail = ContainerRecord::new("abc123").snapshot(&mut exec).unwrap();

        exec.respond(
            "docker run",
            "docker: Error response from daemon: Conflict. The container name \"/web\" is already in use.",
        );
        let err = ContainerLifecycle::commit(&mut exec, &detail, &RunOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandFailed);

        // Retrying the create step with the same descriptor.
        exec.respond("docker run", "0123456789abcdef");
        let id = ContainerLifecycle::create(&mut exec, &detail, &RunOptions::default()).unwrap();
        assert_eq!(id, "0123456789abcdef");
    }

    #[test]
    fn test_stale_edit_never_reaches_host() {
        let mut exec = ScriptedExecutor::new();
        exec.respond("docker inspect", INSPECT_NO_PORTS);
        let mut api = DockerApi::new(exec);

        let err = api
            .edit("abc123", &[ContainerEdit::RemovePort(PortMapping::new("8080", "80"))])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleReference);
        assert_eq!(api.executor().count_matching("docker rm"), 0);
        assert_eq!(api.executor().count_matching("docker run"), 0);
    }
}
