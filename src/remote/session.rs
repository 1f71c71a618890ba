//! SSH session over the `ssh2` crate.

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{Channel, Session};
use tracing::{debug, info, warn};

use super::executor::{BackgroundJob, CommandOutput, RemoteExecutor};
use super::{RemoteError, ServerTarget, shell};
use crate::sentinel::{self, Sentinel};

/// Key pairs tried after the agent, relative to `~/.ssh`.
pub const DEFAULT_KEY_FILES: &[&str] = &["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"];

/// TCP connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Largest file accepted for upload (2 GiB).
const MAX_UPLOAD_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Command used to find out whether the user needs elevation.
const ELEVATION_PROBE: &str = "docker ps -a";

/// Connection tuning for a [`RemoteSession`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// TCP connect timeout. Commands themselves never time out.
    pub connect_timeout: Duration,
    /// Directory holding key pairs; `~/.ssh` when unset.
    pub key_dir: Option<PathBuf>,
    /// Private key file names tried in order; each needs a `.pub` sibling.
    pub key_files: Vec<String>,
    /// Remote directory for background job logs.
    pub background_log_dir: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            key_dir: None,
            key_files: DEFAULT_KEY_FILES.iter().map(|k| (*k).to_string()).collect(),
            background_log_dir: "/tmp".to_string(),
        }
    }
}

/// One authenticated SSH connection to a [`ServerTarget`].
///
/// The session holds at most one live connection. A channel that cannot be
/// opened triggers one reconnect before the error is surfaced. Sessions are
/// independent of each other and may live on different threads.
pub struct RemoteSession {
    target: ServerTarget,
    options: SessionOptions,
    session: Option<Session>,
    elevated: bool,
}

impl RemoteSession {
    /// Connects and authenticates with default options.
    ///
    /// # Errors
    /// Returns `Connection` or `Authentication` if the host cannot be used.
    pub fn open(target: ServerTarget) -> Result<Self, RemoteError> {
        Self::open_with(target, SessionOptions::default())
    }

    /// Connects and authenticates, then probes for elevation if the target
    /// asks for it.
    ///
    /// # Errors
    /// Returns `Connection` or `Authentication` if the host cannot be used.
    pub fn open_with(target: ServerTarget, options: SessionOptions) -> Result<Self, RemoteError> {
        let mut this = Self {
            target,
            options,
            session: None,
            elevated: false,
        };

        this.connect()?;

        if this.target.require_elevation {
            this.probe_elevation()?;
        }

        Ok(this)
    }

    /// Returns the target this session is bound to.
    #[must_use]
    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    /// Returns true if the connection is up and authenticated.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::authenticated)
    }

    /// Disconnects. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
            debug!("Closed session to {}", self.target.connection_string());
        }
    }

    fn connect(&mut self) -> Result<(), RemoteError> {
        self.close();

        let host = self.target.connection_string();
        info!("Connecting to {}", host);

        let tcp = self.tcp_connect()?;
        let mut session = Session::new().map_err(|e| RemoteError::Connection {
            host: host.clone(),
            reason: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| RemoteError::Connection {
            host: host.clone(),
            reason: format!("SSH handshake failed: {}", e),
        })?;

        self.authenticate(&session)?;
        info!("Authenticated to {}", host);

        self.session = Some(session);
        Ok(())
    }

    fn tcp_connect(&self) -> Result<TcpStream, RemoteError> {
        let host = self.target.connection_string();
        let addrs: Vec<SocketAddr> = (self.target.host.as_str(), self.target.port)
            .to_socket_addrs()
            .map_err(|e| RemoteError::Connection {
                host: host.clone(),
                reason: format!("Cannot resolve address: {}", e),
            })?
            .collect();

        let mut last_error = format!("no address for {}", self.target.host);
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.options.connect_timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(RemoteError::Connection {
            host,
            reason: last_error,
        })
    }

    /// Tries the agent, then each key pair, then the password.
    fn authenticate(&self, session: &Session) -> Result<(), RemoteError> {
        let user = self.target.user.as_str();
        let mut attempts = Vec::new();

        match session.userauth_agent(user) {
            Ok(()) if session.authenticated() => {
                debug!("Authenticated with agent");
                return Ok(());
            }
            Ok(()) => attempts.push("agent: not accepted".to_string()),
            Err(e) => attempts.push(format!("agent: {}", e)),
        }

        for (private, public) in self.key_pairs() {
            if !private.exists() || !public.exists() {
                continue;
            }
            match session.userauth_pubkey_file(user, Some(&public), &private, None) {
                Ok(()) if session.authenticated() => {
                    debug!("Authenticated with key {}", private.display());
                    return Ok(());
                }
                Ok(()) => attempts.push(format!("{}: not accepted", private.display())),
                Err(e) => attempts.push(format!("{}: {}", private.display(), e)),
            }
        }

        match self.target.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => match session.userauth_password(user, password) {
                Ok(()) if session.authenticated() => {
                    debug!("Authenticated with password");
                    return Ok(());
                }
                Ok(()) => attempts.push("password: not accepted".to_string()),
                Err(e) => attempts.push(format!("password: {}", e)),
            },
            None => attempts.push("password: none configured".to_string()),
        }

        warn!(
            "All authentication methods failed for {}",
            self.target.connection_string()
        );
        Err(RemoteError::Authentication {
            host: self.target.connection_string(),
            attempts,
        })
    }

    fn key_pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        let dir = self.options.key_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ssh")
        });

        self.options
            .key_files
            .iter()
            .map(|name| (dir.join(name), dir.join(format!("{}.pub", name))))
            .collect()
    }

    fn probe_elevation(&mut self) -> Result<(), RemoteError> {
        let output = self.exec(ELEVATION_PROBE, false)?;
        if sentinel::matches(Sentinel::PermissionDenied, &output.text) {
            info!(
                "{} cannot run docker directly, switching to sudo",
                self.target.user
            );
            self.elevated = true;
        }
        Ok(())
    }

    fn live_session(&mut self) -> Result<&Session, RemoteError> {
        if !self.is_connected() {
            warn!("Session to {} is down, reconnecting", self.target.host);
            self.connect()?;
        }
        self.session.as_ref().ok_or_else(|| RemoteError::Connection {
            host: self.target.connection_string(),
            reason: "not connected".to_string(),
        })
    }

    fn open_channel(&mut self) -> Result<Channel, RemoteError> {
        let first = self.live_session()?.channel_session();
        match first {
            Ok(channel) => Ok(channel),
            Err(e) => {
                warn!("Cannot open channel ({}), reconnecting", e);
                self.connect()?;
                self.live_session()?
                    .channel_session()
                    .map_err(|e| RemoteError::Channel(format!("Cannot open channel: {}", e)))
            }
        }
    }

    fn elevation_password(&self) -> Option<String> {
        self.target.password.clone().filter(|p| !p.is_empty())
    }

    /// Starts `line` on a fresh channel, feeding `stdin` first.
    fn start(&mut self, line: &str, stdin: Option<&str>) -> Result<Channel, RemoteError> {
        let mut channel = self.open_channel()?;
        channel
            .exec(line)
            .map_err(|e| RemoteError::Channel(format!("Cannot execute command: {}", e)))?;

        if let Some(input) = stdin {
            channel
                .write_all(format!("{}\n", input).as_bytes())
                .map_err(|e| RemoteError::Channel(format!("Cannot write stdin: {}", e)))?;
        }
        channel
            .send_eof()
            .map_err(|e| RemoteError::Channel(format!("Cannot close stdin: {}", e)))?;

        Ok(channel)
    }

    fn collect(mut channel: Channel) -> Result<CommandOutput, RemoteError> {
        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|e| RemoteError::Channel(format!("Cannot read output: {}", e)))?;

        let mut stderr = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| RemoteError::Channel(format!("Cannot read stderr: {}", e)))?;

        channel.wait_close().ok();
        let exit_status = channel.exit_status().ok();

        let mut text = String::from_utf8_lossy(&stdout).into_owned();
        if !stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&stderr));
        }

        Ok(CommandOutput::new(shell::strip_sudo_prompt(&text), exit_status))
    }
}

impl RemoteExecutor for RemoteSession {
    fn exec(&mut self, command: &str, elevated: bool) -> Result<CommandOutput, RemoteError> {
        assert!(!command.is_empty(), "command must not be empty");

        let merged = format!("{} 2>&1", command);
        let password = if elevated {
            self.elevation_password()
        } else {
            None
        };
        let line = if elevated {
            shell::elevate(&merged, password.is_some())
        } else {
            merged
        };

        let channel = self.start(&line, password.as_deref())?;
        let output = Self::collect(channel)?;
        debug!("exit status {:?} for: {}", output.exit_status, command);
        Ok(output)
    }

    fn spawn_detached(
        &mut self,
        command: &str,
        log_path: &str,
        elevated: bool,
    ) -> Result<BackgroundJob, RemoteError> {
        assert!(!command.is_empty(), "command must not be empty");

        let password = if elevated {
            self.elevation_password()
        } else {
            None
        };
        let sudo = if elevated { "sudo -n " } else { "" };
        let launch = format!(
            "nohup {}sh -c {} > {} 2>&1 & echo $!",
            sudo,
            shell::quote(command),
            shell::quote(log_path)
        );
        // The detached sudo cannot read stdin, so validate the credential first.
        let line = if password.is_some() {
            format!("sudo -S -p '' -v; {}", launch)
        } else {
            launch
        };

        let channel = self.start(&line, password.as_deref())?;
        let output = Self::collect(channel)?;
        let job = BackgroundJob::from_launch_output(command, log_path, &output.text);
        info!("Launched background job {:?}: {}", job.pid, command);
        Ok(job)
    }

    fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), RemoteError> {
        assert!(!remote_path.is_empty(), "remote_path must not be empty");

        let size = fs::metadata(local_path)?.len();
        if size > MAX_UPLOAD_SIZE {
            return Err(RemoteError::Transfer {
                path: remote_path.to_string(),
                reason: format!("file too large: {} bytes (max: {})", size, MAX_UPLOAD_SIZE),
            });
        }
        let data = fs::read(local_path)?;

        if let Some(parent) = Path::new(remote_path).parent().and_then(Path::to_str) {
            if !parent.is_empty() && parent != "/" {
                self.create_directory(parent)?;
            }
        }

        let transfer_error = |e: &dyn std::fmt::Display| RemoteError::Transfer {
            path: remote_path.to_string(),
            reason: e.to_string(),
        };

        let session = self.live_session()?;
        let mut channel = session
            .scp_send(Path::new(remote_path), 0o644, size, None)
            .map_err(|e| transfer_error(&e))?;
        channel.write_all(&data).map_err(|e| transfer_error(&e))?;
        channel.send_eof().map_err(|e| transfer_error(&e))?;
        channel.wait_eof().map_err(|e| transfer_error(&e))?;
        channel.close().map_err(|e| transfer_error(&e))?;
        channel.wait_close().map_err(|e| transfer_error(&e))?;

        info!("Uploaded {} to {}", local_path.display(), remote_path);
        Ok(())
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, RemoteError> {
        assert!(!remote_path.is_empty(), "remote_path must not be empty");

        let transfer_error = |e: &dyn std::fmt::Display| RemoteError::Transfer {
            path: remote_path.to_string(),
            reason: e.to_string(),
        };

        let session = self.live_session()?;
        let (mut channel, stat) = session
            .scp_recv(Path::new(remote_path))
            .map_err(|e| transfer_error(&e))?;

        let mut data = Vec::with_capacity(stat.size() as usize);
        channel
            .read_to_end(&mut data)
            .map_err(|e| transfer_error(&e))?;
        channel.send_eof().ok();
        channel.wait_eof().ok();
        channel.close().ok();
        channel.wait_close().ok();

        fs::write(local_path, &data)?;
        Ok(data.len() as u64)
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn set_elevated(&mut self, elevated: bool) {
        if elevated != self.elevated {
            debug!("Elevation for {} set to {}", self.target.host, elevated);
        }
        self.elevated = elevated;
    }

    fn background_log_dir(&self) -> &str {
        &self.options.background_log_dir
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(
            options.key_files,
            vec!["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"]
        );
        assert_eq!(options.background_log_dir, "/tmp");
    }

    #[test]
    fn test_unresolvable_host_is_connection_error() {
        let target = ServerTarget::new("host.invalid", "deploy");
        let options = SessionOptions {
            connect_timeout: Duration::from_millis(200),
            ..SessionOptions::default()
        };
        match RemoteSession::open_with(target, options) {
            Err(err) => assert!(err.is_connection_error()),
            Ok(_) => panic!("connecting to .invalid must fail"),
        }
    }
}
