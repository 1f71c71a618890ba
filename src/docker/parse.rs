//! Parsers for docker CLI output.
//!
//! All functions are pure: they take the raw text returned by
//! [`RemoteExecutor::run_raw`](crate::remote::RemoteExecutor::run_raw) and
//! never touch the network.

use serde_json::Value;
use tracing::{debug, warn};

use super::container::ContainerSummary;
use super::document::InspectDocument;
use super::error::DockerError;
use super::image::ImageSummary;
use super::runtime::{ContainerStats, HealthReport, LogLine, NetworkSummary};
use crate::sentinel::{self, Sentinel};

/// Maximum number of rows taken from one listing.
pub const MAX_PARSE_ITEMS: usize = 5000;

/// Minimum tab-separated fields for a container row.
pub const MIN_CONTAINER_FIELDS: usize = 4;

/// Minimum tab-separated fields for an image row.
const MIN_IMAGE_FIELDS: usize = 3;

/// Minimum whitespace-separated columns for a stats row.
pub const MIN_STATS_COLUMNS: usize = 7;

/// Parses `docker ps -a` output in `ID\tName\tImage\tStatus\tPorts\tCommand`
/// order. Rows with fewer than four fields are dropped.
#[must_use]
pub fn parse_container_listing(output: &str) -> Vec<ContainerSummary> {
    let mut containers = Vec::new();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        if containers.len() >= MAX_PARSE_ITEMS {
            warn!("Container listing truncated at {} rows", MAX_PARSE_ITEMS);
            break;
        }

        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < MIN_CONTAINER_FIELDS || fields[0].is_empty() {
            debug!("Skipping listing row: {}", line);
            continue;
        }

        let optional = |index: usize| {
            fields
                .get(index)
                .map(|f| f.trim_matches('"').to_string())
                .filter(|f| !f.is_empty())
        };

        containers.push(ContainerSummary::new(
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            optional(4),
            optional(5),
        ));
    }

    containers
}

/// Parses `docker images` output in `ID\tRepository\tTag\tSize\tCreatedAt`
/// order. A header row, if the CLI printed one, is skipped.
#[must_use]
pub fn parse_image_listing(output: &str) -> Vec<ImageSummary> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty()).peekable();

    if lines
        .peek()
        .is_some_and(|first| first.contains("IMAGE ID") || first.starts_with("REPOSITORY"))
    {
        lines.next();
    }

    lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < MIN_IMAGE_FIELDS || fields[0].is_empty() {
                debug!("Skipping image row: {}", line);
                return None;
            }
            let field = |index: usize| fields.get(index).map(|f| (*f).to_string()).unwrap_or_default();
            Some(ImageSummary {
                id: field(0),
                repository: field(1),
                tag: field(2),
                size: field(3),
                created_at: field(4),
            })
        })
        .take(MAX_PARSE_ITEMS)
        .collect()
}

/// Decodes `docker inspect` output into one document.
///
/// Empty output, a bare `[]`, an empty array and daemon error text all mean
/// the object does not exist. A single-element array yields that element.
///
/// # Errors
/// Returns `NotFound` for the cases above and `MalformedOutput` when the
/// text is not JSON.
pub fn parse_inspect(output: &str, what: &'static str, id: &str) -> Result<InspectDocument, DockerError> {
    let text = output.trim();
    let not_found = || DockerError::NotFound {
        what,
        id: id.to_string(),
    };

    if text.is_empty() || text == "[]" || sentinel::matches(Sentinel::DaemonErrorPrefix, text) {
        return Err(not_found());
    }

    // Only the first JSON value counts; the CLI may append error lines.
    let first = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next();

    let value = match first {
        Some(Ok(value)) => value,
        _ if sentinel::matches(Sentinel::NoSuchObject, text) => return Err(not_found()),
        _ => return Err(DockerError::malformed(format!("{} inspect", what), text)),
    };

    match value {
        Value::Array(items) => {
            if items.len() > 1 {
                warn!("inspect of {} returned {} objects, using the first", id, items.len());
            }
            items
                .into_iter()
                .next()
                .filter(Value::is_object)
                .map(InspectDocument::new)
                .ok_or_else(not_found)
        }
        Value::Object(_) => Ok(InspectDocument::new(value)),
        _ => Err(DockerError::malformed(format!("{} inspect", what), text)),
    }
}

/// Parses `docker stats --no-stream` table output.
///
/// Rows need at least seven whitespace-separated columns; memory usage is
/// columns 3 and 4 joined by a space.
#[must_use]
pub fn parse_stats(output: &str) -> Vec<ContainerStats> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.contains("CONTAINER ID"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < MIN_STATS_COLUMNS {
                debug!("Skipping stats row: {}", line);
                return None;
            }
            let span = |from: usize, to: usize| cols.get(from..to).map(|c| c.join(" "));
            Some(ContainerStats {
                container_id: cols[0].to_string(),
                name: cols[1].to_string(),
                cpu_percent: cols[2].to_string(),
                mem_usage: format!("{} {}", cols[3], cols[4]),
                mem_limit: cols[5].to_string(),
                mem_percent: cols[6].to_string(),
                net_io: span(7, 10),
                block_io: span(10, 13),
                pids: cols.get(13).map(|p| (*p).to_string()),
            })
        })
        .collect()
}

/// Splits container output into lines, lifting a leading `[timestamp]` or
/// RFC 3339 timestamp out of each.
#[must_use]
pub fn parse_logs(output: &str) -> Vec<LogLine> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let trimmed = line.trim_end();
            if let Some(rest) = trimmed.strip_prefix('[') {
                if let Some((stamp, message)) = rest.split_once(']') {
                    return LogLine {
                        timestamp: Some(stamp.to_string()),
                        message: message.trim_start().to_string(),
                    };
                }
            }
            if let Some((first, rest)) = trimmed.split_once(' ') {
                if chrono::DateTime::parse_from_rfc3339(first).is_ok() {
                    return LogLine {
                        timestamp: Some(first.to_string()),
                        message: rest.to_string(),
                    };
                }
            }
            LogLine {
                timestamp: None,
                message: trimmed.to_string(),
            }
        })
        .collect()
}

/// Parses `docker inspect --format '{{json .State.Health}}'` output.
///
/// # Errors
/// Returns `MalformedOutput` if the text is neither `null` nor a health
/// object.
pub fn parse_health(output: &str) -> Result<Option<HealthReport>, DockerError> {
    let text = output.trim();
    if text.is_empty() || text == "null" || text == "<no value>" {
        return Ok(None);
    }
    serde_json::from_str::<Option<HealthReport>>(text)
        .map_err(|_| DockerError::malformed("health", text))
}

/// Parses `docker network ls` output in `ID\tName\tDriver\tScope` order.
#[must_use]
pub fn parse_network_listing(output: &str) -> Vec<NetworkSummary> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 2 || fields[0].is_empty() {
                return None;
            }
            let field = |index: usize| fields.get(index).map(|f| (*f).to_string()).unwrap_or_default();
            Some(NetworkSummary {
                id: field(0),
                name: field(1),
                driver: field(2),
                scope: field(3),
            })
        })
        .take(MAX_PARSE_ITEMS)
        .collect()
}
