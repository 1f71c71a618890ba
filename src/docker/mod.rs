//! Docker containers and images on a remote host, driven through the
//! `docker` CLI over a [`RemoteExecutor`](crate::remote::RemoteExecutor).
//!
//! Layers, bottom up:
//! - [`command`] builds every command line sent to a host.
//! - [`parse`] turns CLI output into typed rows and documents.
//! - [`ContainerRecord`] is the lazily inspected read model of one
//!   container; [`ContainerDetail`] is an immutable snapshot that edits
//!   are applied to.
//! - [`ContainerInventory`] reads, [`ContainerLifecycle`] changes state.
//! - [`DockerApi`] binds both to one executor.

pub mod api;
pub mod command;
pub mod container;
pub mod detail;
pub mod document;
pub mod error;
pub mod image;
pub mod inventory;
pub mod lifecycle;
pub mod mapping;
pub mod parse;
pub mod runtime;

pub use api::{DEFAULT_STAGING_DIR, DockerApi};
pub use command::{PruneScope, RunOptions};
pub use container::{ContainerRecord, ContainerStatus, ContainerSummary};
pub use detail::{ContainerDetail, ContainerEdit};
pub use document::InspectDocument;
pub use error::{DockerError, ErrorKind};
pub use image::{ImageRef, ImageSummary};
pub use inventory::{ComposeSupport, ContainerInventory, DockerAvailability};
pub use lifecycle::{BuildReport, BuildRequest, ContainerLifecycle, PullMode, PullOutcome};
pub use mapping::{EnvVar, Mapping, MappingSet, PortMapping, VolumeMapping};
pub use runtime::{ContainerStats, HealthProbe, HealthReport, LogLine, NetworkSummary};
