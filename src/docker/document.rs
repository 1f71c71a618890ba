//! Typed access to `docker inspect` output.
//!
//! The decoded JSON is kept as a [`serde_json::Value`] tree; the helpers
//! below pull out the handful of fields this crate works with and spell out
//! what happens when one is missing.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tracing::debug;

use super::mapping::{EnvVar, MappingSet, PortMapping, VolumeMapping};

/// Bind addresses that mean "all interfaces" and are left out of the host
/// side of a port mapping.
const WILDCARD_ADDRESSES: &[&str] = &["", "0.0.0.0", "::"];

/// One object from `docker inspect` or `docker image inspect`.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectDocument {
    root: Value,
}

impl InspectDocument {
    /// Wraps an already decoded object.
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The whole tree.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Follows `path` through nested objects.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.root, |node, key| node.get(key))
            .filter(|v| !v.is_null())
    }

    /// String at `path`, if present and a string.
    #[must_use]
    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Strings of the array at `path`; non-string elements are skipped.
    #[must_use]
    pub fn strings_at(&self, path: &[&str]) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.str_at(&["Id"])
    }

    /// Container name without the leading `/`.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.str_at(&["Name"])
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| !n.is_empty())
    }

    /// `Config.Image`, the reference the container was created from.
    #[must_use]
    pub fn image_reference(&self) -> Option<&str> {
        self.str_at(&["Config", "Image"]).filter(|s| !s.is_empty())
    }

    /// `State.Status`, e.g. `running`.
    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.str_at(&["State", "Status"])
    }

    /// `State.Health.Status`, present only with a health check.
    #[must_use]
    pub fn health_status(&self) -> Option<&str> {
        self.str_at(&["State", "Health", "Status"])
    }

    /// `HostConfig.RestartPolicy.Name`.
    #[must_use]
    pub fn restart_policy(&self) -> Option<&str> {
        self.str_at(&["HostConfig", "RestartPolicy", "Name"])
            .filter(|s| !s.is_empty())
    }

    /// `Created` as a timestamp.
    #[must_use]
    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.str_at(&["Created"])?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                debug!("Unparseable Created '{}': {}", raw, e);
                None
            }
        }
    }

    /// `Config.Env` split at the first `=`.
    #[must_use]
    pub fn env(&self) -> MappingSet<EnvVar> {
        self.strings_at(&["Config", "Env"])
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Some(EnvVar::new(key, value)),
                Some(_) => None,
                None if !entry.is_empty() => Some(EnvVar::new(entry.as_str(), "")),
                None => None,
            })
            .collect()
    }

    /// `Config.Cmd` joined with spaces; empty when unset.
    #[must_use]
    pub fn command(&self) -> String {
        match self.get(&["Config", "Cmd"]) {
            Some(Value::String(cmd)) => cmd.clone(),
            Some(Value::Array(_)) => self.strings_at(&["Config", "Cmd"]).join(" "),
            _ => String::new(),
        }
    }

    /// Published ports from `HostConfig.PortBindings`, or from
    /// `NetworkSettings.Ports` when no bindings are configured.
    ///
    /// Unpublished ports and bindings without a host port are skipped.
    #[must_use]
    pub fn ports(&self) -> MappingSet<PortMapping> {
        let configured = Self::port_map(self.get(&["HostConfig", "PortBindings"]));
        if !configured.is_empty() {
            return configured;
        }

        // Runtime view lists IPv4 and IPv6 bindings separately.
        let mut runtime = MappingSet::new();
        for port in Self::port_map(self.get(&["NetworkSettings", "Ports"])).iter() {
            if !runtime.contains(port) {
                runtime.add(port.clone());
            }
        }
        runtime
    }

    fn port_map(node: Option<&Value>) -> MappingSet<PortMapping> {
        let mut ports = MappingSet::new();
        let Some(map) = node.and_then(Value::as_object) else {
            return ports;
        };

        for (key, bindings) in map {
            let container_port = match key.split_once('/') {
                Some((port, "tcp")) => port.to_string(),
                Some((port, proto)) => format!("{}/{}", port, proto),
                None => key.clone(),
            };
            let Some(bindings) = bindings.as_array() else {
                continue;
            };

            for binding in bindings {
                let host_port = binding
                    .get("HostPort")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if host_port.is_empty() || container_port.is_empty() {
                    continue;
                }
                let host_ip = binding
                    .get("HostIp")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let host = if WILDCARD_ADDRESSES.contains(&host_ip) {
                    host_port.to_string()
                } else {
                    format!("{}:{}", host_ip, host_port)
                };
                ports.add(PortMapping::new(host, container_port.clone()));
            }
        }

        ports
    }

    /// `Mounts` as `source:destination`. Named volumes use the volume name.
    #[must_use]
    pub fn volumes(&self) -> MappingSet<VolumeMapping> {
        let Some(mounts) = self.get(&["Mounts"]).and_then(Value::as_array) else {
            return MappingSet::new();
        };

        mounts
            .iter()
            .filter_map(|mount| {
                let field = |key: &str| {
                    mount
                        .get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                };
                let destination = field("Destination")?;
                let source = match field("Type") {
                    Some("volume") => field("Name").or_else(|| field("Source")),
                    _ => field("Source"),
                }?;
                Some(VolumeMapping::new(source, destination))
            })
            .collect()
    }

    /// `RepoTags` of an image document.
    #[must_use]
    pub fn repo_tags(&self) -> Vec<String> {
        self.strings_at(&["RepoTags"])
    }

    /// `RepoDigests` of an image document.
    #[must_use]
    pub fn repo_digests(&self) -> Vec<String> {
        self.strings_at(&["RepoDigests"])
    }

    /// `Size` of an image document in bytes.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.get(&["Size"]).and_then(Value::as_u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> InspectDocument {
        InspectDocument::new(json!({
            "Id": "abc123def4567890",
            "Name": "/web",
            "Created": "2024-03-01T10:15:30.123456789Z",
            "State": { "Status": "running", "Health": { "Status": "healthy" } },
            "Config": {
                "Image": "nginx:1.25",
                "Env": ["PATH=/usr/bin", "URL=a=b", "EMPTY="],
                "Cmd": ["nginx", "-g", "daemon off;"]
            },
            "HostConfig": {
                "PortBindings": {
                    "80/tcp": [{ "HostIp": "", "HostPort": "8080" }],
                    "53/udp": [{ "HostIp": "127.0.0.1", "HostPort": "5353" }]
                },
                "RestartPolicy": { "Name": "always" }
            },
            "Mounts": [
                { "Type": "bind", "Source": "/srv/html", "Destination": "/usr/share/nginx/html" },
                { "Type": "volume", "Name": "cache", "Source": "/var/lib/docker/volumes/cache/_data", "Destination": "/cache" }
            ]
        }))
    }

    #[test]
    fn test_scalar_fields() {
        let doc = sample();
        assert_eq!(doc.name().as_deref(), Some("web"));
        assert_eq!(doc.image_reference(), Some("nginx:1.25"));
        assert_eq!(doc.status_text(), Some("running"));
        assert_eq!(doc.health_status(), Some("healthy"));
        assert_eq!(doc.restart_policy(), Some("always"));
        assert_eq!(doc.created().map(|c| c.timestamp()), Some(1_709_288_130));
    }

    #[test]
    fn test_env_split_at_first_equals() {
        let env = sample().env();
        assert_eq!(env.encoded(), vec!["PATH=/usr/bin", "URL=a=b", "EMPTY="]);
    }

    #[test]
    fn test_command_joined() {
        assert_eq!(sample().command(), "nginx -g daemon off;");
        assert_eq!(InspectDocument::new(json!({ "Config": { "Cmd": null } })).command(), "");
    }

    #[test]
    fn test_ports_from_bindings() {
        let ports = sample().ports();
        assert_eq!(ports.encoded(), vec!["127.0.0.1:5353:53/udp", "8080:80"]);
    }

    #[test]
    fn test_ports_fall_back_to_network_settings() {
        let doc = InspectDocument::new(json!({
            "HostConfig": { "PortBindings": {} },
            "NetworkSettings": { "Ports": {
                "80/tcp": [
                    { "HostIp": "0.0.0.0", "HostPort": "8080" },
                    { "HostIp": "::", "HostPort": "8080" }
                ],
                "443/tcp": null
            }}
        }));
        assert_eq!(doc.ports().encoded(), vec!["8080:80"]);
    }

    #[test]
    fn test_volumes() {
        assert_eq!(
            sample().volumes().encoded(),
            vec!["/srv/html:/usr/share/nginx/html", "cache:/cache"]
        );
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let doc = InspectDocument::new(json!({}));
        assert!(doc.name().is_none());
        assert!(doc.env().is_empty());
        assert!(doc.ports().is_empty());
        assert!(doc.volumes().is_empty());
        assert!(doc.created().is_none());
    }
}
