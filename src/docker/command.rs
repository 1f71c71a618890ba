//! Docker CLI command lines.
//!
//! Every string sent to a host is built here. Arguments coming from callers
//! are quoted with [`shell::quote`], except pair flags which use
//! [`shell::word`] so that simple values read `-p 8080:80`.

use std::collections::BTreeMap;

use super::detail::ContainerDetail;
use crate::remote::shell;

/// Container listing, fields `ID, Name, Image, Status, Ports, Command`.
pub const LIST_CONTAINERS: &str = r#"LC_ALL=C docker ps -a --format "{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.Command}}""#;

/// Image listing, fields `ID, Repository, Tag, Size, CreatedAt`.
pub const LIST_IMAGES: &str =
    r#"docker images --format "{{.ID}}\t{{.Repository}}\t{{.Tag}}\t{{.Size}}\t{{.CreatedAt}}""#;

/// Network listing, fields `ID, Name, Driver, Scope`.
pub const LIST_NETWORKS: &str =
    r#"docker network ls --format "{{.ID}}\t{{.Name}}\t{{.Driver}}\t{{.Scope}}""#;

/// Daemon version; fails when the daemon is unreachable.
pub const DAEMON_VERSION: &str = "LC_ALL=C docker version --format '{{.Server.Version}}'";

/// Compose plugin probe.
pub const COMPOSE_PLUGIN_VERSION: &str = "docker compose version";

/// Standalone compose probe.
pub const COMPOSE_STANDALONE_VERSION: &str = "docker-compose --version";

/// Default number of log lines fetched.
pub const DEFAULT_LOG_TAIL: usize = 100;

/// Health check interval passed to `docker run`.
const HEALTH_INTERVAL: &str = "30s";

/// Health check timeout passed to `docker run`.
const HEALTH_TIMEOUT: &str = "10s";

/// Health check retries passed to `docker run`.
const HEALTH_RETRIES: u32 = 3;

/// Extra `docker run` settings not carried by a [`ContainerDetail`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Adds `--restart always`.
    pub restart_always: bool,
    /// Adds health check flags running this command.
    pub health_check: Option<String>,
}

impl RunOptions {
    /// Options that keep the restart policy `detail` reports.
    #[must_use]
    pub fn preserving(detail: &ContainerDetail) -> Self {
        Self {
            restart_always: detail.restarts_always(),
            health_check: None,
        }
    }
}

/// What `docker system prune` removes besides stopped containers and
/// dangling images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneScope {
    /// All unused images, not only dangling ones.
    pub all_images: bool,
    /// Unused volumes.
    pub volumes: bool,
}

#[must_use]
pub fn inspect_container(id: &str) -> String {
    format!("LC_ALL=C docker inspect {}", shell::quote(id))
}

#[must_use]
pub fn inspect_image(reference: &str) -> String {
    format!("LC_ALL=C docker image inspect {}", shell::quote(reference))
}

#[must_use]
pub fn start(id: &str) -> String {
    format!("LC_ALL=C docker start {}", shell::quote(id))
}

#[must_use]
pub fn stop(id: &str) -> String {
    format!("LC_ALL=C docker stop {}", shell::quote(id))
}

#[must_use]
pub fn restart(id: &str) -> String {
    format!("LC_ALL=C docker restart {}", shell::quote(id))
}

/// `docker rm`, with `-f` when forced.
#[must_use]
pub fn remove(id: &str, force: bool) -> String {
    let flag = if force { "-f " } else { "" };
    format!("LC_ALL=C docker rm {}{}", flag, shell::quote(id))
}

#[must_use]
pub fn pull(reference: &str) -> String {
    format!("docker pull {}", shell::word(reference))
}

#[must_use]
pub fn logs(id: &str, tail: usize) -> String {
    format!("docker logs --tail={} {}", tail, shell::quote(id))
}

/// Streams logs into a background job's log file.
#[must_use]
pub fn follow_logs(id: &str) -> String {
    format!("docker logs -f {}", shell::quote(id))
}

#[must_use]
pub fn stats(id: &str) -> String {
    format!("LC_ALL=C docker stats --no-stream {}", shell::quote(id))
}

#[must_use]
pub fn health(id: &str) -> String {
    format!(
        "docker inspect --format '{{{{json .State.Health}}}}' {}",
        shell::quote(id)
    )
}

/// `docker run` recreating `detail`.
///
/// Order: `-d`, restart policy, `--name`, one `-p`/`-v`/`-e` per entry in
/// collection order, health flags, image, then the command if any.
#[must_use]
pub fn run(detail: &ContainerDetail, options: &RunOptions) -> String {
    assert!(!detail.name.is_empty(), "name must not be empty");
    assert!(!detail.image.is_empty(), "image must not be empty");

    let mut parts: Vec<String> = vec!["docker".to_string(), "run".to_string(), "-d".to_string()];

    if options.restart_always {
        parts.push("--restart always".to_string());
    }
    parts.push(format!("--name {}", shell::quote(&detail.name)));

    parts.extend(detail.ports.flags());
    parts.extend(detail.volumes.flags());
    parts.extend(detail.env.flags());

    if let Some(check) = options.health_check.as_deref().filter(|c| !c.trim().is_empty()) {
        parts.push(format!("--health-cmd={}", shell::quote(check)));
        parts.push(format!("--health-interval={}", HEALTH_INTERVAL));
        parts.push(format!("--health-timeout={}", HEALTH_TIMEOUT));
        parts.push(format!("--health-retries={}", HEALTH_RETRIES));
    }

    parts.push(shell::word(&detail.image));

    let command = detail.command.trim();
    if !command.is_empty() {
        parts.push(command.to_string());
    }

    parts.join(" ")
}

/// `docker build` tagging `image_name:latest`, teeing output to `log_path`.
#[must_use]
pub fn build(
    dockerfile: &str,
    image_name: &str,
    build_args: &BTreeMap<String, String>,
    context_dir: &str,
    log_path: &str,
) -> String {
    let mut command = format!(
        "docker build -f {} -t {}:latest",
        shell::quote(dockerfile),
        shell::quote(image_name)
    );
    for (key, value) in build_args {
        command.push_str(&format!(" --build-arg {}", shell::quote(&format!("{}={}", key, value))));
    }
    command.push_str(&format!(
        " {} 2>&1 | tee {}",
        shell::quote(context_dir),
        shell::quote(log_path)
    ));
    command
}

/// Prints a build log, or a placeholder when there is none.
#[must_use]
pub fn read_log(log_path: &str) -> String {
    format!(
        "cat {} 2>/dev/null || echo \"No log available\"",
        shell::quote(log_path)
    )
}

/// Unpacks a gzip tarball into `dir`, replacing what was there.
#[must_use]
pub fn extract_archive(archive: &str, dir: &str) -> String {
    format!(
        "rm -rf {dir} && mkdir -p {dir} && tar -xzf {archive} -C {dir}",
        dir = shell::quote(dir),
        archive = shell::quote(archive)
    )
}

#[must_use]
pub fn prune(scope: PruneScope) -> String {
    let mut command = "docker system prune -f".to_string();
    if scope.all_images {
        command.push_str(" -a");
    }
    if scope.volumes {
        command.push_str(" --volumes");
    }
    command
}

#[must_use]
pub fn create_network(name: &str, driver: &str) -> String {
    format!(
        "docker network create --driver {} {}",
        shell::quote(driver),
        shell::quote(name)
    )
}

/// `<compose> -f <file> up -d` run from `dir`.
#[must_use]
pub fn compose_up(binary: &str, dir: &str, file: &str) -> String {
    format!(
        "cd {} && {} -f {} up -d",
        shell::quote(dir),
        binary,
        shell::quote(file)
    )
}

/// `<compose> -f <file> down` run from `dir`.
#[must_use]
pub fn compose_down(binary: &str, dir: &str, file: &str) -> String {
    format!(
        "cd {} && {} -f {} down",
        shell::quote(dir),
        binary,
        shell::quote(file)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::container::ContainerStatus;
    use crate::docker::mapping::{EnvVar, MappingSet, PortMapping, VolumeMapping};

    fn detail() -> ContainerDetail {
        ContainerDetail {
            id: "abc123".to_string(),
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            status: ContainerStatus::Running,
            ports: vec![PortMapping::new("8080", "80"), PortMapping::new("8443", "443")]
                .into_iter()
                .collect(),
            volumes: vec![VolumeMapping::new("/srv/html", "/usr/share/nginx/html")]
                .into_iter()
                .collect(),
            env: vec![EnvVar::new("MODE", "prod")].into_iter().collect(),
            command: "nginx -g 'daemon off;'".to_string(),
            restart_policy: None,
        }
    }

    #[test]
    fn test_listing_uses_literal_tab_escape() {
        assert!(LIST_CONTAINERS.contains(r"{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.Command}}"));
        assert!(LIST_CONTAINERS.starts_with("LC_ALL=C "));
    }

    #[test]
    fn test_run_command_order() {
        let command = run(&detail(), &RunOptions::default());
        assert_eq!(
            command,
            "docker run -d --name 'web' -p 8080:80 -p 8443:443 \
             -v /srv/html:/usr/share/nginx/html -e MODE=prod nginx:latest nginx -g 'daemon off;'"
        );
    }

    #[test]
    fn test_run_command_options() {
        let mut d = detail();
        d.ports = MappingSet::new();
        d.command = String::new();
        let options = RunOptions {
            restart_always: true,
            health_check: Some("curl -f http://localhost/".to_string()),
        };
        let command = run(&d, &options);
        assert!(command.starts_with("docker run -d --restart always --name 'web'"));
        assert!(command.contains(
            "--health-cmd='curl -f http://localhost/' --health-interval=30s --health-timeout=10s --health-retries=3"
        ));
        assert!(command.ends_with("nginx:latest"));
        assert!(!command.contains("-p "));
    }

    #[test]
    fn test_build_command() {
        let mut args = BTreeMap::new();
        args.insert("VERSION".to_string(), "1.2".to_string());
        let command = build("/tmp/Dockerfile", "web", &args, "/tmp", "/tmp/docker_build_web.log");
        assert_eq!(
            command,
            "docker build -f '/tmp/Dockerfile' -t 'web':latest --build-arg 'VERSION=1.2' '/tmp' 2>&1 | tee '/tmp/docker_build_web.log'"
        );
    }

    #[test]
    fn test_remove_and_prune() {
        assert_eq!(remove("abc", false), "LC_ALL=C docker rm 'abc'");
        assert_eq!(remove("abc", true), "LC_ALL=C docker rm -f 'abc'");
        assert_eq!(
            prune(PruneScope { all_images: true, volumes: true }),
            "docker system prune -f -a --volumes"
        );
    }

    #[test]
    fn test_health_format_braces() {
        assert_eq!(
            health("abc"),
            "docker inspect --format '{{json .State.Health}}' 'abc'"
        );
    }
}
