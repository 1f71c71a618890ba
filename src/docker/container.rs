//! Container status, listing rows and the lazily hydrated container record.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::detail::{ContainerDetail, ContainerEdit};
use super::document::InspectDocument;
use super::error::DockerError;
use super::image::ImageRef;
use super::inventory::ContainerInventory;
use super::mapping::{EnvVar, MappingSet, PortMapping, VolumeMapping};
use crate::remote::RemoteExecutor;

/// Characters of the ID used in the fallback name.
const SHORT_ID_LEN: usize = 12;

/// Container state as shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Running,
    Created,
    Starting,
    Stopped,
    Exited,
    Error,
}

impl ContainerStatus {
    /// Maps CLI status text (`Up 2 hours`, `running`, `Exited (0) ...`) to a
    /// status. Checks run in a fixed order; unknown text maps to `Error`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        let has = |needle: &str| raw.contains(needle);

        if has("up") || has("running") {
            Self::Running
        } else if has("creat") {
            Self::Created
        } else if has("start") || has("restart") {
            Self::Starting
        } else if has("exit") {
            Self::Exited
        } else if has("stop") || has("pause") {
            Self::Stopped
        } else {
            Self::Error
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Created => "CREATED",
            Self::Starting => "STARTING",
            Self::Stopped => "STOPPED",
            Self::Exited => "EXITED",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `docker ps -a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Status text as printed, e.g. `Up 2 hours`.
    pub status_text: String,
    pub status: ContainerStatus,
    /// Port column as printed, e.g. `0.0.0.0:8080->80/tcp`.
    pub ports: Option<String>,
    pub command: Option<String>,
}

impl ContainerSummary {
    /// Creates a row; the status is derived from `status_text`.
    #[must_use]
    pub fn new(
        id: &str,
        name: &str,
        image: &str,
        status_text: &str,
        ports: Option<String>,
        command: Option<String>,
    ) -> Self {
        assert!(!id.is_empty(), "id must not be empty");

        Self {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            status_text: status_text.to_string(),
            status: ContainerStatus::parse(status_text),
            ports,
            command,
        }
    }

    /// Short one-line description.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} ({}) - {}", self.name, self.image, self.status_text)
    }
}

/// Read model of one container, identified by its daemon ID.
///
/// Construction is cheap. The first accessor that needs detail runs one
/// `docker inspect` and caches the document for the rest of the record's
/// life; each derived field is cached separately on first use. A not-found
/// or undecodable answer is cached too; transport failures are not.
///
/// Mutators change only the cached collections. Neither the daemon nor the
/// cached document sees an edit until the caller commits a
/// [`ContainerDetail`] through
/// [`ContainerLifecycle::commit`](super::lifecycle::ContainerLifecycle::commit).
///
/// A record is not shared between threads; work on separate records when
/// operating on the same container concurrently.
#[derive(Debug)]
pub struct ContainerRecord {
    id: String,
    summary: Option<ContainerSummary>,
    document: Option<InspectDocument>,
    failure: Option<DockerError>,
    hydrations: usize,
    name: Option<String>,
    image: Option<ImageRef>,
    status: Option<ContainerStatus>,
    created_at: Option<Option<DateTime<FixedOffset>>>,
    ports: Option<MappingSet<PortMapping>>,
    volumes: Option<MappingSet<VolumeMapping>>,
    env: Option<MappingSet<EnvVar>>,
    command: Option<String>,
}

impl Clone for ContainerRecord {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            summary: self.summary.clone(),
            document: self.document.clone(),
            failure: self.failure.as_ref().and_then(DockerError::definitive_copy),
            hydrations: self.hydrations,
            name: self.name.clone(),
            image: self.image.clone(),
            status: self.status,
            created_at: self.created_at,
            ports: self.ports.clone(),
            volumes: self.volumes.clone(),
            env: self.env.clone(),
            command: self.command.clone(),
        }
    }
}

impl ContainerRecord {
    /// Creates an unhydrated record.
    ///
    /// # Panics
    /// Panics if `id` is empty.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        assert!(!id.is_empty(), "id must not be empty");

        Self {
            id,
            summary: None,
            document: None,
            failure: None,
            hydrations: 0,
            name: None,
            image: None,
            status: None,
            created_at: None,
            ports: None,
            volumes: None,
            env: None,
            command: None,
        }
    }

    /// Creates a record with name and status pre-filled from a listing row.
    #[must_use]
    pub fn from_summary(summary: ContainerSummary) -> Self {
        let mut record = Self::new(summary.id.clone());
        if !summary.name.is_empty() {
            record.name = Some(summary.name.clone());
        }
        record.status = Some(summary.status);
        record.summary = Some(summary);
        record
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Listing row this record was built from, if any.
    #[must_use]
    pub fn summary(&self) -> Option<&ContainerSummary> {
        self.summary.as_ref()
    }

    /// Returns true once the inspect document is cached.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.document.is_some()
    }

    /// Number of inspect round-trips this record has made (0 or 1).
    #[must_use]
    pub fn hydration_count(&self) -> usize {
        self.hydrations
    }

    /// Returns the inspect document, fetching it on first use.
    ///
    /// # Errors
    /// Returns `NotFound` if the container is gone, or any transport error.
    pub fn inspect<E>(&mut self, exec: &mut E) -> Result<&InspectDocument, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Some(copy) = self.failure.as_ref().and_then(DockerError::definitive_copy) {
            return Err(copy);
        }
        if self.document.is_none() {
            debug!("Hydrating container {}", self.id);
            match ContainerInventory::inspect_document(exec, &self.id) {
                Ok(document) => {
                    self.hydrations += 1;
                    self.document = Some(document);
                }
                Err(e) => {
                    self.failure = e.definitive_copy();
                    return Err(e);
                }
            }
        }
        match &self.document {
            Some(document) => Ok(document),
            None => Err(DockerError::NotFound {
                what: "Container",
                id: self.id.clone(),
            }),
        }
    }

    /// Container name; `container_<short id>` when it cannot be read.
    pub fn name<E>(&mut self, exec: &mut E) -> String
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Some(name) = &self.name {
            return name.clone();
        }

        let inspected = match self.inspect(exec) {
            Ok(document) => document.name(),
            Err(e) => {
                warn!("Cannot read name of {}: {}", self.id, e);
                None
            }
        };
        let name = inspected.unwrap_or_else(|| self.fallback_name());

        self.name = Some(name.clone());
        name
    }

    fn fallback_name(&self) -> String {
        let short: String = self.id.chars().take(SHORT_ID_LEN).collect();
        format!("container_{}", short)
    }

    /// Image the container runs. Falls back to the bare reference when the
    /// image itself cannot be inspected.
    ///
    /// # Errors
    /// Returns an error if neither the container nor the listing row names
    /// an image.
    pub fn image<E>(&mut self, exec: &mut E) -> Result<ImageRef, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Some(image) = &self.image {
            return Ok(image.clone());
        }

        let listed = self
            .summary
            .as_ref()
            .map(|s| s.image.clone())
            .filter(|i| !i.is_empty());
        let reference = match self.inspect(exec) {
            Ok(document) => document.image_reference().map(str::to_string).or(listed),
            Err(e) => Some(listed.ok_or(e)?),
        };
        let reference = reference
            .ok_or_else(|| DockerError::malformed("container inspect", "missing Config.Image"))?;

        let image = match ContainerInventory::inspect_image(exec, &reference) {
            Ok(image) => image,
            Err(e) => {
                debug!("Image {} not inspectable ({}), using reference", reference, e);
                ImageRef::from_reference(&reference)
            }
        };

        self.image = Some(image.clone());
        Ok(image)
    }

    /// Status from the listing row, or from inspection; `Error` when neither
    /// is available.
    pub fn status<E>(&mut self, exec: &mut E) -> ContainerStatus
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Some(status) = self.status {
            return status;
        }

        let status = match self.inspect(exec) {
            Ok(document) => document
                .status_text()
                .map_or(ContainerStatus::Error, ContainerStatus::parse),
            Err(e) => {
                warn!("Cannot read status of {}: {}", self.id, e);
                ContainerStatus::Error
            }
        };
        self.status = Some(status);
        status
    }

    /// Creation time.
    ///
    /// # Errors
    /// Returns any inspection error.
    pub fn created_at<E>(&mut self, exec: &mut E) -> Result<Option<DateTime<FixedOffset>>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if let Some(created) = self.created_at {
            return Ok(created);
        }
        let created = self.inspect(exec)?.created();
        self.created_at = Some(created);
        Ok(created)
    }

    /// Published ports.
    ///
    /// # Errors
    /// Returns any inspection error.
    pub fn ports<E>(&mut self, exec: &mut E) -> Result<&MappingSet<PortMapping>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        Ok(&*self.ports_mut(exec)?)
    }

    fn ports_mut<E>(&mut self, exec: &mut E) -> Result<&mut MappingSet<PortMapping>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if self.ports.is_none() {
            let ports = self.inspect(exec)?.ports();
            self.ports = Some(ports);
        }
        Ok(self.ports.get_or_insert_with(MappingSet::new))
    }

    /// Mounted volumes.
    ///
    /// # Errors
    /// Returns any inspection error.
    pub fn volumes<E>(&mut self, exec: &mut E) -> Result<&MappingSet<VolumeMapping>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        Ok(&*self.volumes_mut(exec)?)
    }

    fn volumes_mut<E>(&mut self, exec: &mut E) -> Result<&mut MappingSet<VolumeMapping>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if self.volumes.is_none() {
            let volumes = self.inspect(exec)?.volumes();
            self.volumes = Some(volumes);
        }
        Ok(self.volumes.get_or_insert_with(MappingSet::new))
    }

    /// Environment variables.
    ///
    /// # Errors
    /// Returns any inspection error.
    pub fn env<E>(&mut self, exec: &mut E) -> Result<&MappingSet<EnvVar>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        Ok(&*self.env_mut(exec)?)
    }

    fn env_mut<E>(&mut self, exec: &mut E) -> Result<&mut MappingSet<EnvVar>, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if self.env.is_none() {
            let env = self.inspect(exec)?.env();
            self.env = Some(env);
        }
        Ok(self.env.get_or_insert_with(MappingSet::new))
    }

    /// Command as a space-joined argv.
    ///
    /// # Errors
    /// Returns any inspection error.
    pub fn command<E>(&mut self, exec: &mut E) -> Result<&str, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        if self.command.is_none() {
            let command = self.inspect(exec)?.command();
            self.command = Some(command);
        }
        Ok(self.command.get_or_insert_with(String::new).as_str())
    }

    /// Applies an edit to the cached collections.
    ///
    /// # Errors
    /// Returns `StaleReference` when removing or replacing a pair that is
    /// not present, or any inspection error.
    pub fn apply<E>(&mut self, exec: &mut E, edit: &ContainerEdit) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        debug!("Editing {}: {}", self.id, edit);
        match edit {
            ContainerEdit::AddPort(port) => self.ports_mut(exec)?.add(port.clone()),
            ContainerEdit::RemovePort(port) => {
                self.ports_mut(exec)?.remove(port)?;
            }
            ContainerEdit::ReplacePort { from, to } => self.ports_mut(exec)?.replace(from, to.clone())?,
            ContainerEdit::AddVolume(volume) => self.volumes_mut(exec)?.add(volume.clone()),
            ContainerEdit::RemoveVolume(volume) => {
                self.volumes_mut(exec)?.remove(volume)?;
            }
            ContainerEdit::ReplaceVolume { from, to } => {
                self.volumes_mut(exec)?.replace(from, to.clone())?;
            }
            ContainerEdit::AddEnv(var) => self.env_mut(exec)?.add(var.clone()),
            ContainerEdit::RemoveEnv(var) => {
                self.env_mut(exec)?.remove(var)?;
            }
            ContainerEdit::ReplaceEnv { from, to } => self.env_mut(exec)?.replace(from, to.clone())?,
            ContainerEdit::SetCommand(command) => self.set_command(command.clone()),
        }
        Ok(())
    }

    /// Adds a port mapping in memory.
    pub fn add_port<E>(&mut self, exec: &mut E, port: PortMapping) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::AddPort(port))
    }

    /// Removes the exact port mapping in memory.
    pub fn remove_port<E>(&mut self, exec: &mut E, port: PortMapping) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::RemovePort(port))
    }

    pub fn add_volume<E>(&mut self, exec: &mut E, volume: VolumeMapping) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::AddVolume(volume))
    }

    pub fn remove_volume<E>(&mut self, exec: &mut E, volume: VolumeMapping) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::RemoveVolume(volume))
    }

    pub fn add_env<E>(&mut self, exec: &mut E, var: EnvVar) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::AddEnv(var))
    }

    pub fn remove_env<E>(&mut self, exec: &mut E, var: EnvVar) -> Result<(), DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        self.apply(exec, &ContainerEdit::RemoveEnv(var))
    }

    /// Replaces the command in memory. Needs no inspection.
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = Some(command.into().trim().to_string());
    }

    /// Freezes the current view, edits included, into a descriptor.
    ///
    /// Ports that cannot be read become an empty set instead of failing the
    /// snapshot.
    ///
    /// # Errors
    /// Returns an error if the image, volumes, env or command cannot be
    /// read.
    pub fn snapshot<E>(&mut self, exec: &mut E) -> Result<ContainerDetail, DockerError>
    where
        E: RemoteExecutor + ?Sized,
    {
        let name = self.name(exec);
        let image = self.image(exec)?.repo_with_tag();
        let status = self.status(exec);
        let ports = match self.ports(exec) {
            Ok(ports) => ports.clone(),
            Err(e) => {
                warn!("Ports of {} unavailable, using none: {}", self.id, e);
                MappingSet::new()
            }
        };
        let volumes = self.volumes(exec)?.clone();
        let env = self.env(exec)?.clone();
        let command = self.command(exec)?.to_string();
        let restart_policy = self
            .document
            .as_ref()
            .and_then(|d| d.restart_policy())
            .map(str::to_string);

        Ok(ContainerDetail {
            id: self.id.clone(),
            name,
            image,
            status,
            ports,
            volumes,
            env,
            command,
            restart_policy,
        })
    }
}
