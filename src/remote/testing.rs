//! In-memory executor for tests.
//!
//! [`ScriptedExecutor`] answers commands from a script keyed by command
//! substring and records every call, so docker-level code can be exercised
//! without a host.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::RemoteError;
use super::executor::{BackgroundJob, CommandOutput, RemoteExecutor};

/// First PID handed out to detached commands.
const FIRST_PID: u32 = 4000;

/// One executed or launched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    /// Command as received.
    pub command: String,
    /// Whether it ran elevated.
    pub elevated: bool,
    /// Whether it was launched in the background.
    pub detached: bool,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(Vec<CommandOutput>),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    elevated: Option<bool>,
    reply: Reply,
    served: usize,
}

/// Scripted [`RemoteExecutor`].
///
/// Rules registered later take precedence over earlier ones. Commands that
/// match no rule produce empty output with exit status 0.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    journal: Vec<ExecRecord>,
    elevated: bool,
    uploads: Vec<(PathBuf, String)>,
    files: HashMap<String, Vec<u8>>,
    next_pid: u32,
}

impl ScriptedExecutor {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_pid: FIRST_PID,
            ..Self::default()
        }
    }

    /// Starts in elevated mode.
    #[must_use]
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    fn push(&mut self, needle: &str, elevated: Option<bool>, reply: Reply) -> &mut Self {
        assert!(!needle.is_empty(), "needle must not be empty");
        self.rules.push(Rule {
            needle: needle.to_string(),
            elevated,
            reply,
            served: 0,
        });
        self
    }

    /// Answers commands containing `needle` with `text` and status 0.
    pub fn respond(&mut self, needle: &str, text: &str) -> &mut Self {
        self.push(needle, None, Reply::Output(vec![CommandOutput::new(text, Some(0))]))
    }

    /// Answers commands containing `needle` with a full output.
    pub fn respond_with(&mut self, needle: &str, output: CommandOutput) -> &mut Self {
        self.push(needle, None, Reply::Output(vec![output]))
    }

    /// Answers only unelevated attempts.
    pub fn respond_unelevated(&mut self, needle: &str, text: &str) -> &mut Self {
        self.push(
            needle,
            Some(false),
            Reply::Output(vec![CommandOutput::new(text, Some(1))]),
        )
    }

    /// Answers only elevated attempts.
    pub fn respond_elevated(&mut self, needle: &str, text: &str) -> &mut Self {
        self.push(
            needle,
            Some(true),
            Reply::Output(vec![CommandOutput::new(text, Some(0))]),
        )
    }

    /// Answers successive calls with successive texts; the last one repeats.
    pub fn respond_sequence(&mut self, needle: &str, texts: &[&str]) -> &mut Self {
        assert!(!texts.is_empty(), "texts must not be empty");
        let outputs = texts
            .iter()
            .map(|t| CommandOutput::new(*t, Some(0)))
            .collect();
        self.push(needle, None, Reply::Output(outputs))
    }

    /// Fails commands containing `needle` with a channel error.
    pub fn fail(&mut self, needle: &str, message: &str) -> &mut Self {
        self.push(needle, None, Reply::Fail(message.to_string()))
    }

    /// Makes `remote_path` available to [`RemoteExecutor::download`].
    pub fn serve_file(&mut self, remote_path: &str, content: &[u8]) -> &mut Self {
        self.files.insert(remote_path.to_string(), content.to_vec());
        self
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn journal(&self) -> &[ExecRecord] {
        &self.journal
    }

    /// Commands issued so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.journal.iter().map(|r| r.command.clone()).collect()
    }

    /// Number of calls whose command contains `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.journal
            .iter()
            .filter(|r| r.command.contains(needle))
            .count()
    }

    /// Last command containing `needle`.
    #[must_use]
    pub fn last_matching(&self, needle: &str) -> Option<&str> {
        self.journal
            .iter()
            .rev()
            .find(|r| r.command.contains(needle))
            .map(|r| r.command.as_str())
    }

    /// Uploaded files as (local path, remote path).
    #[must_use]
    pub fn uploads(&self) -> &[(PathBuf, String)] {
        &self.uploads
    }

    fn answer(&mut self, command: &str, elevated: bool) -> Result<CommandOutput, RemoteError> {
        let rule = self.rules.iter_mut().rev().find(|r| {
            command.contains(&r.needle) && r.elevated.is_none_or(|e| e == elevated)
        });

        let Some(rule) = rule else {
            return Ok(CommandOutput::new("", Some(0)));
        };

        match &rule.reply {
            Reply::Fail(message) => Err(RemoteError::Channel(message.clone())),
            Reply::Output(outputs) => {
                let index = rule.served.min(outputs.len() - 1);
                rule.served += 1;
                Ok(outputs[index].clone())
            }
        }
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn exec(&mut self, command: &str, elevated: bool) -> Result<CommandOutput, RemoteError> {
        self.journal.push(ExecRecord {
            command: command.to_string(),
            elevated,
            detached: false,
        });
        self.answer(command, elevated)
    }

    fn spawn_detached(
        &mut self,
        command: &str,
        log_path: &str,
        elevated: bool,
    ) -> Result<BackgroundJob, RemoteError> {
        self.journal.push(ExecRecord {
            command: command.to_string(),
            elevated,
            detached: true,
        });
        self.answer(command, elevated)?;

        let pid = self.next_pid;
        self.next_pid += 1;
        Ok(BackgroundJob {
            pid: Some(pid),
            log_path: log_path.to_string(),
            command: command.to_string(),
        })
    }

    fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), RemoteError> {
        if !local_path.exists() {
            return Err(RemoteError::Transfer {
                path: remote_path.to_string(),
                reason: format!("{} does not exist", local_path.display()),
            });
        }
        self.uploads
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError> {
        let content = self
            .files
            .get(remote_path)
            .ok_or_else(|| RemoteError::Transfer {
                path: remote_path.to_string(),
                reason: "no such file".to_string(),
            })?;
        fs::write(local_path, content)?;
        Ok(content.len() as u64)
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn set_elevated(&mut self, elevated: bool) {
        self.elevated = elevated;
    }
}
