//! Image references and image listing rows.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::document::InspectDocument;

/// Tag assumed when a reference has none.
pub const DEFAULT_TAG: &str = "latest";

/// Placeholder the CLI prints for a missing repository or tag.
const NONE_MARKER: &str = "<none>";

/// An image as known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
    /// Content ID, empty when built from a bare reference.
    pub id: String,
    pub created: Option<DateTime<FixedOffset>>,
    /// Size in bytes.
    pub size: Option<u64>,
    pub digests: Vec<String>,
}

impl ImageRef {
    /// Splits a reference such as `registry:5000/app:1.2` into repository
    /// and tag. Digest references keep the digest and get the default tag.
    ///
    /// # Panics
    /// Panics if `reference` is empty.
    #[must_use]
    pub fn from_reference(reference: &str) -> Self {
        let reference = reference.trim();
        assert!(!reference.is_empty(), "reference must not be empty");

        let (name, digests) = match reference.split_once('@') {
            Some((name, _)) => (name, vec![reference.to_string()]),
            None => (reference, Vec::new()),
        };

        let (repository, tag) = match name.rsplit_once(':') {
            // A ':' followed by a '/' belongs to a registry port.
            Some((repo, tag)) if !tag.contains('/') && !repo.is_empty() && !tag.is_empty() => {
                (repo.to_string(), tag.to_string())
            }
            _ => (name.to_string(), DEFAULT_TAG.to_string()),
        };

        Self {
            repository,
            tag,
            id: String::new(),
            created: None,
            size: None,
            digests,
        }
    }

    /// Builds from `docker image inspect` output, using the first repo tag or
    /// `requested` when the image is untagged.
    #[must_use]
    pub fn from_document(doc: &InspectDocument, requested: &str) -> Self {
        let tags = doc.repo_tags();
        let mut image = match tags.first() {
            Some(tag) => Self::from_reference(tag),
            // Untagged images are addressed by ID only.
            None if requested.starts_with("sha256:") => Self {
                repository: requested.to_string(),
                tag: String::new(),
                ..Self::from_reference(requested)
            },
            None => Self::from_reference(requested),
        };

        if let Some(id) = doc.id() {
            image.id = id.to_string();
        }
        image.created = doc.created();
        image.size = doc.size();
        let digests = doc.repo_digests();
        if !digests.is_empty() {
            image.digests = digests;
        }
        image
    }

    /// `repository:tag`, or the repository alone for an untagged image.
    #[must_use]
    pub fn repo_with_tag(&self) -> String {
        if self.tag.is_empty() {
            self.repository.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo_with_tag())
    }
}

/// One row of `docker images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub repository: String,
    pub tag: String,
    /// Human-readable size, e.g. `187MB`.
    pub size: String,
    pub created_at: String,
}

impl ImageSummary {
    /// Name usable in `docker run`: `repo:tag`, the repository alone when
    /// untagged, or the ID when dangling.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.repository == NONE_MARKER || self.repository.is_empty() {
            self.id.clone()
        } else if self.tag == NONE_MARKER || self.tag.is_empty() {
            self.repository.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }

    /// Returns true for images with neither repository nor tag.
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.repository == NONE_MARKER && self.tag == NONE_MARKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_parsing() {
        let plain = ImageRef::from_reference("nginx");
        assert_eq!((plain.repository.as_str(), plain.tag.as_str()), ("nginx", "latest"));

        let tagged = ImageRef::from_reference("nginx:1.25");
        assert_eq!(tagged.repo_with_tag(), "nginx:1.25");

        let registry = ImageRef::from_reference("registry:5000/team/app");
        assert_eq!(registry.repository, "registry:5000/team/app");
        assert_eq!(registry.tag, "latest");

        let both = ImageRef::from_reference("registry:5000/team/app:2.0");
        assert_eq!(both.repository, "registry:5000/team/app");
        assert_eq!(both.tag, "2.0");
    }

    #[test]
    fn test_digest_reference() {
        let image = ImageRef::from_reference("alpine@sha256:abcd");
        assert_eq!(image.repository, "alpine");
        assert_eq!(image.tag, "latest");
        assert_eq!(image.digests, vec!["alpine@sha256:abcd"]);
    }

    #[test]
    fn test_from_document() {
        let doc = InspectDocument::new(json!({
            "Id": "sha256:feed",
            "RepoTags": ["web:2.1", "web:latest"],
            "RepoDigests": ["web@sha256:beef"],
            "Created": "2024-01-02T03:04:05Z",
            "Size": 1024
        }));
        let image = ImageRef::from_document(&doc, "web");
        assert_eq!(image.repo_with_tag(), "web:2.1");
        assert_eq!(image.id, "sha256:feed");
        assert_eq!(image.size, Some(1024));
        assert_eq!(image.digests, vec!["web@sha256:beef"]);
        assert!(image.created.is_some());
    }

    #[test]
    fn test_untagged_document_uses_request() {
        let doc = InspectDocument::new(json!({ "Id": "sha256:feed", "RepoTags": [] }));
        let image = ImageRef::from_document(&doc, "sha256:feed");
        assert_eq!(image.repo_with_tag(), "sha256:feed");
        assert_eq!(image.id, "sha256:feed");

        let named = ImageRef::from_document(&doc, "web");
        assert_eq!(named.repo_with_tag(), "web:latest");
    }

    #[test]
    fn test_summary_full_name() {
        let mut summary = ImageSummary {
            id: "f00d".to_string(),
            repository: "nginx".to_string(),
            tag: "1.25".to_string(),
            size: "187MB".to_string(),
            created_at: String::new(),
        };
        assert_eq!(summary.full_name(), "nginx:1.25");
        summary.tag = NONE_MARKER.to_string();
        assert_eq!(summary.full_name(), "nginx");
        summary.repository = NONE_MARKER.to_string();
        assert_eq!(summary.full_name(), "f00d");
        assert!(summary.is_dangling());
    }
}
