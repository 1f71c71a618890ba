//! Runtime observations: stats, logs, health and networks.

use serde::{Deserialize, Serialize};

/// One row of `docker stats --no-stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub name: String,
    pub cpu_percent: String,
    /// Usage as printed, e.g. `12.5MiB /`.
    pub mem_usage: String,
    pub mem_limit: String,
    pub mem_percent: String,
    pub net_io: Option<String>,
    pub block_io: Option<String>,
    pub pids: Option<String>,
}

/// One line of container output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: Option<String>,
    pub message: String,
}

/// Health check state from `State.Health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "FailingStreak", default)]
    pub failing_streak: u32,
    #[serde(rename = "Log", default)]
    pub log: Vec<HealthProbe>,
}

impl HealthReport {
    /// Output of the most recent probe.
    #[must_use]
    pub fn last_output(&self) -> Option<&str> {
        self.log.last().map(|probe| probe.output.trim_end())
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// One health probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {
    #[serde(rename = "ExitCode", default)]
    pub exit_code: i64,
    #[serde(rename = "Output", default)]
    pub output: String,
}

/// One row of `docker network ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
}
