//! Port, volume and environment pairs and their ordered collections.
//!
//! Each pair has one string encoding (`host:container`, `source:target`,
//! `KEY=VALUE`) used for display, for the `docker run` flag and as the
//! identity when removing or replacing an entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DockerError;

/// A pair that renders to one `docker run` flag.
pub trait Mapping: Clone + PartialEq + fmt::Display {
    /// Name used in error messages.
    const KIND: &'static str;
    /// `docker run` flag introducing the pair.
    const FLAG: &'static str;

    /// Parses the string encoding.
    fn parse(value: &str) -> Result<Self, DockerError>;
}

/// Host port published to a container port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    host_port: String,
    container_port: String,
}

impl PortMapping {
    /// Creates a mapping.
    ///
    /// # Panics
    /// Panics if either port is empty.
    #[must_use]
    pub fn new(host_port: impl Into<String>, container_port: impl Into<String>) -> Self {
        let host_port = host_port.into();
        let container_port = container_port.into();
        assert!(!host_port.is_empty(), "host_port must not be empty");
        assert!(!container_port.is_empty(), "container_port must not be empty");
        Self {
            host_port,
            container_port,
        }
    }

    /// Host side, possibly prefixed with a bind address.
    #[must_use]
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// Container side, possibly suffixed with `/udp`.
    #[must_use]
    pub fn container_port(&self) -> &str {
        &self.container_port
    }

    /// Moves the mapping to another host port.
    pub fn set_host_port(&mut self, host_port: impl Into<String>) {
        let host_port = host_port.into();
        assert!(!host_port.is_empty(), "host_port must not be empty");
        self.host_port = host_port;
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}

impl Mapping for PortMapping {
    const KIND: &'static str = "Port";
    const FLAG: &'static str = "-p";

    fn parse(value: &str) -> Result<Self, DockerError> {
        match value.trim().rsplit_once(':') {
            Some((host, container)) if !host.is_empty() && !container.is_empty() => {
                Ok(Self::new(host, container))
            }
            _ => Err(DockerError::InvalidMapping {
                kind: Self::KIND,
                value: value.to_string(),
            }),
        }
    }
}

/// Host path or named volume mounted at a container path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeMapping {
    source: String,
    target: String,
}

impl VolumeMapping {
    /// Creates a mapping.
    ///
    /// # Panics
    /// Panics if either side is empty.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        assert!(!source.is_empty(), "source must not be empty");
        assert!(!target.is_empty(), "target must not be empty");
        Self { source, target }
    }

    /// Creates a mapping from untrusted input.
    ///
    /// # Errors
    /// Returns `InvalidMapping` if either side is blank.
    pub fn try_new(source: &str, target: &str) -> Result<Self, DockerError> {
        let (source, target) = (source.trim(), target.trim());
        if source.is_empty() || target.is_empty() {
            return Err(DockerError::InvalidMapping {
                kind: Self::KIND,
                value: format!("{}:{}", source, target),
            });
        }
        Ok(Self::new(source, target))
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Mounts the source somewhere else.
    pub fn set_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        assert!(!target.is_empty(), "target must not be empty");
        self.target = target;
    }
}

impl fmt::Display for VolumeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

impl Mapping for VolumeMapping {
    const KIND: &'static str = "Volume";
    const FLAG: &'static str = "-v";

    fn parse(value: &str) -> Result<Self, DockerError> {
        match value.trim().split_once(':') {
            Some((source, target)) => Self::try_new(source, target),
            None => Err(DockerError::InvalidMapping {
                kind: Self::KIND,
                value: value.to_string(),
            }),
        }
    }
}

/// Environment variable. Keys may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvVar {
    key: String,
    value: String,
}

impl EnvVar {
    /// Creates a variable. The value may be empty.
    ///
    /// # Panics
    /// Panics if `key` is empty.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "key must not be empty");
        Self {
            key,
            value: value.into(),
        }
    }

    /// Creates a variable from untrusted input.
    ///
    /// # Errors
    /// Returns `InvalidMapping` if `key` is blank or contains `=`.
    pub fn try_new(key: &str, value: &str) -> Result<Self, DockerError> {
        let key = key.trim();
        if key.is_empty() || key.contains('=') {
            return Err(DockerError::InvalidMapping {
                kind: Self::KIND,
                value: format!("{}={}", key, value),
            });
        }
        Ok(Self::new(key, value))
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl Mapping for EnvVar {
    const KIND: &'static str = "Env";
    const FLAG: &'static str = "-e";

    fn parse(value: &str) -> Result<Self, DockerError> {
        match value.split_once('=') {
            Some((key, val)) => Self::try_new(key, val),
            None => Err(DockerError::InvalidMapping {
                kind: Self::KIND,
                value: value.to_string(),
            }),
        }
    }
}

/// Ordered collection of pairs. Order is kept through every edit and is the
/// order flags are rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingSet<T> {
    items: Vec<T>,
}

impl<T> Default for MappingSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Mapping> MappingSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item`.
    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes the last entry equal to `item`.
    ///
    /// # Errors
    /// Returns `StaleReference` if no entry matches.
    pub fn remove(&mut self, item: &T) -> Result<T, DockerError> {
        let index = self.position(item)?;
        Ok(self.items.remove(index))
    }

    /// Replaces the last entry equal to `old` with `new`, in place.
    ///
    /// # Errors
    /// Returns `StaleReference` if no entry matches.
    pub fn replace(&mut self, old: &T, new: T) -> Result<(), DockerError> {
        let index = self.position(old)?;
        self.items[index] = new;
        Ok(())
    }

    fn position(&self, item: &T) -> Result<usize, DockerError> {
        self.items
            .iter()
            .rposition(|existing| existing == item)
            .ok_or_else(|| DockerError::StaleReference {
                kind: T::KIND,
                pair: item.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Entries in their string encoding.
    #[must_use]
    pub fn encoded(&self) -> Vec<String> {
        self.items.iter().map(ToString::to_string).collect()
    }

    /// Renders one flag per entry, e.g. `-p 8080:80`.
    #[must_use]
    pub fn flags(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| format!("{} {}", T::FLAG, crate::remote::shell::word(&item.to_string())))
            .collect()
    }
}

impl<T: Mapping> FromIterator<T> for MappingSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a MappingSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::docker::error::ErrorKind;

    #[test]
    fn test_port_parse_and_display() {
        let port = PortMapping::parse("8080:80").unwrap();
        assert_eq!(port.host_port(), "8080");
        assert_eq!(port.container_port(), "80");
        assert_eq!(port.to_string(), "8080:80");

        let bound = PortMapping::parse("127.0.0.1:8080:80").unwrap();
        assert_eq!(bound.host_port(), "127.0.0.1:8080");
        assert!(PortMapping::parse("8080").is_err());
    }

    #[test]
    fn test_env_keeps_equals_in_value() {
        let env = EnvVar::parse("URL=postgres://u:p@db/x?a=b").unwrap();
        assert_eq!(env.key(), "URL");
        assert_eq!(env.value(), "postgres://u:p@db/x?a=b");
        assert!(EnvVar::parse("=value").is_err());
    }

    #[test]
    fn test_remove_missing_is_stale() {
        let mut ports: MappingSet<PortMapping> = MappingSet::new();
        ports.add(PortMapping::new("8080", "80"));
        let err = ports.remove(&PortMapping::new("9090", "90")).unwrap_err();
        assert_eq!(err.to_string(), "Port 9090:90 not found.");
        assert_eq!(ports.len(), 1);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut volumes: MappingSet<VolumeMapping> = ["a:/a", "b:/b", "c:/c"]
            .iter()
            .map(|v| VolumeMapping::parse(v).unwrap())
            .collect();
        volumes
            .replace(&VolumeMapping::new("b", "/b"), VolumeMapping::new("b", "/srv/b"))
            .unwrap();
        assert_eq!(volumes.encoded(), vec!["a:/a", "b:/srv/b", "c:/c"]);
    }

    #[test]
    fn test_flags_in_order() {
        let env: MappingSet<EnvVar> = vec![EnvVar::new("A", "1"), EnvVar::new("B", "two words")]
            .into_iter()
            .collect();
        assert_eq!(env.flags(), vec!["-e A=1", "-e 'B=two words'"]);
    }

    #[test]
    fn test_duplicate_keys_removed_by_exact_pair() {
        let mut env: MappingSet<EnvVar> = MappingSet::new();
        env.add(EnvVar::new("PATH", "/bin"));
        env.add(EnvVar::new("PATH", "/usr/bin"));
        env.remove(&EnvVar::new("PATH", "/bin")).unwrap();
        assert_eq!(env.encoded(), vec!["PATH=/usr/bin"]);
    }

    #[test]
    fn test_blank_fields_rejected() {
        let err = VolumeMapping::try_new("", "/data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Local);
        assert!(VolumeMapping::try_new("/srv", "  ").is_err());
        assert!(VolumeMapping::parse(":/data").is_err());
        assert!(EnvVar::try_new("", "x").is_err());
        assert!(EnvVar::try_new("A=B", "x").is_err());
        assert!(EnvVar::parse("=x").is_err());

        assert_eq!(VolumeMapping::try_new(" /srv ", "/data").unwrap().to_string(), "/srv:/data");
        assert_eq!(EnvVar::try_new("MODE", "").unwrap().to_string(), "MODE=");
    }
}
