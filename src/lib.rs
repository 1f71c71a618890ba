//! Dockhand
//!
//! Manages Docker containers on remote hosts over SSH by driving the
//! `docker` CLI.
//!
//! # Architecture
//!
//! - **Remote Module**: SSH sessions, elevation fallback and the executor
//!   trait every Docker operation runs through
//! - **Docker Module**: container records, command construction, output
//!   parsing, and edit-by-recreate
//! - **Sentinel Module**: classification of CLI output text
//! - **Config / Logging**: `~/.dockhand` configuration and log files
//!
//! # Usage
//!
//! ```no_run
//! use dockhand::docker::{ContainerEdit, DockerApi, PortMapping};
//! use dockhand::remote::{RemoteSession, ServerTarget};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = RemoteSession::open(ServerTarget::new("10.0.0.5", "deploy"))?;
//! let mut api = DockerApi::new(session);
//! let desired = api.edit("abc123", &[ContainerEdit::AddPort(PortMapping::new("8080", "80"))])?;
//! api.commit(&desired)?;
//! # Ok(())
//! # }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod docker;
pub mod logging;
pub mod remote;
pub mod sentinel;

// Re-export main types
pub use config::{Config, ConfigError, ServerEntry};
pub use docker::{ContainerDetail, ContainerEdit, ContainerRecord, DockerApi, DockerError, ErrorKind};
pub use remote::{RemoteError, RemoteExecutor, RemoteSession, ServerTarget};
