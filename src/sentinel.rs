//! Output classification by sentinel substrings.
//!
//! The docker CLI reports most outcomes only as human-readable text. Every
//! phrase this crate looks for lives in [`RULES`]; call sites ask for a
//! [`Sentinel`] and never spell out the text themselves.

/// An outcome recognized from command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// The user may not talk to the daemon or touch a path.
    PermissionDenied,
    /// Output starts with a daemon or CLI error line.
    DaemonErrorPrefix,
    /// The daemon reported an error somewhere in the output.
    DaemonError,
    /// The referenced container, image or object does not exist.
    NoSuchObject,
    /// The CLI is installed but the daemon is unreachable.
    DaemonUnreachable,
    /// The CLI binary is missing.
    CliMissing,
    /// `docker run` rejected its arguments.
    RunRejected,
    /// An image build finished.
    BuildSucceeded,
    /// An image pull finished.
    PullSucceeded,
    /// sudo wanted a password it did not get.
    SudoPasswordRequired,
}

#[derive(Debug, Clone, Copy)]
enum Match {
    Contains,
    ContainsIgnoreCase,
    StartsWith,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    sentinel: Sentinel,
    needle: &'static str,
    how: Match,
}

const fn rule(sentinel: Sentinel, needle: &'static str, how: Match) -> Rule {
    Rule {
        sentinel,
        needle,
        how,
    }
}

/// Every recognized phrase.
const RULES: &[Rule] = &[
    rule(Sentinel::PermissionDenied, "permission denied", Match::ContainsIgnoreCase),
    rule(Sentinel::DaemonErrorPrefix, "Error response from daemon", Match::StartsWith),
    rule(Sentinel::DaemonErrorPrefix, "Error: No such", Match::StartsWith),
    rule(Sentinel::DaemonErrorPrefix, "Error: ", Match::StartsWith),
    rule(Sentinel::DaemonError, "Error response from daemon", Match::Contains),
    rule(Sentinel::NoSuchObject, "no such container", Match::ContainsIgnoreCase),
    rule(Sentinel::NoSuchObject, "no such image", Match::ContainsIgnoreCase),
    rule(Sentinel::NoSuchObject, "no such object", Match::ContainsIgnoreCase),
    rule(Sentinel::DaemonUnreachable, "Cannot connect to the Docker daemon", Match::Contains),
    rule(Sentinel::DaemonUnreachable, "Is the docker daemon running", Match::Contains),
    rule(Sentinel::CliMissing, "command not found", Match::Contains),
    rule(Sentinel::CliMissing, "docker: not found", Match::Contains),
    rule(Sentinel::RunRejected, "docker: Error", Match::Contains),
    rule(Sentinel::RunRejected, "invalid reference format", Match::Contains),
    rule(Sentinel::RunRejected, "Error response from daemon", Match::Contains),
    rule(Sentinel::BuildSucceeded, "Successfully built", Match::Contains),
    rule(Sentinel::BuildSucceeded, "Successfully tagged", Match::Contains),
    rule(Sentinel::BuildSucceeded, "naming to ", Match::Contains),
    rule(Sentinel::PullSucceeded, "Downloaded newer image", Match::Contains),
    rule(Sentinel::PullSucceeded, "Image is up to date", Match::Contains),
    rule(Sentinel::PullSucceeded, "Download complete", Match::Contains),
    rule(Sentinel::SudoPasswordRequired, "a password is required", Match::Contains),
    rule(Sentinel::SudoPasswordRequired, "a terminal is required", Match::Contains),
];

impl Rule {
    fn hits(&self, text: &str) -> bool {
        match self.how {
            Match::Contains => text.contains(self.needle),
            Match::ContainsIgnoreCase => text
                .to_ascii_lowercase()
                .contains(&self.needle.to_ascii_lowercase()),
            Match::StartsWith => text.trim_start().starts_with(self.needle),
        }
    }
}

/// Returns true if `text` shows `sentinel`.
#[must_use]
pub fn matches(sentinel: Sentinel, text: &str) -> bool {
    RULES
        .iter()
        .filter(|r| r.sentinel == sentinel)
        .any(|r| r.hits(text))
}

/// Returns every sentinel found in `text`, in table order, without repeats.
#[must_use]
pub fn classify(text: &str) -> Vec<Sentinel> {
    let mut found = Vec::new();
    for r in RULES {
        if !found.contains(&r.sentinel) && r.hits(text) {
            found.push(r.sentinel);
        }
    }
    found
}
