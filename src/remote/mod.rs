//! Remote shell sessions to the booted instance.
//!
//! [`SecureShellConnector`] retries a no-op `ssh` command until the instance
//! accepts the generated key, then hands out a [`RemoteSession`] that reuses
//! the multiplexed master connection for every transfer and command.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::PrivateKey;
use crate::pause::pause;

mod config;
mod exec;
mod key;
mod types;

pub use config::ShellConfig;
pub use exec::{
    DEFAULT_COOLDOWN, ExecError, ExecutionSummary, INSTALL_COMMAND, RecordedCommand,
    RemoteExecutionRunner, SETTINGS_REMOTE_PATH, TEST_DEFINITION_REMOTE_PATH, test_command,
};
pub use types::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};

use key::SessionFiles;

/// Default number of connection attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default delay between two connection attempts.
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Errors raised while establishing a session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Every attempt exited non-zero.
    #[error("could not reach {user}@{host} after {attempts} attempts: {last_stderr}")]
    Exhausted {
        /// Target host.
        host: String,
        /// Remote user.
        user: String,
        /// Attempts made.
        attempts: u32,
        /// Standard error of the final attempt.
        last_stderr: String,
    },
    /// The client could not be started at all.
    #[error(transparent)]
    Spawn(CommandError),
    /// The key file or control directory could not be prepared.
    #[error("failed to prepare the session key file: {0}")]
    Key(String),
    /// The run was cancelled between attempts.
    #[error("connection attempts cancelled")]
    Cancelled,
}

/// Establishes sessions with bounded, fixed-backoff retries.
#[derive(Clone, Debug)]
pub struct SecureShellConnector<R: CommandRunner> {
    config: ShellConfig,
    runner: R,
    max_attempts: u32,
    backoff: Duration,
}

impl<R: CommandRunner> SecureShellConnector<R> {
    /// Creates a connector with the default retry policy.
    #[must_use]
    pub const fn new(config: ShellConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            backoff: DEFAULT_CONNECT_BACKOFF,
        }
    }

    /// Overrides the delay between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Overrides the attempt limit.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Returns the underlying command runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Connects to `host` with the generated key.
    ///
    /// Non-zero exits are transient and retried after the backoff; no attempt
    /// is made past the limit.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Key`] when the key file cannot be written,
    /// [`ConnectError::Spawn`] when the client cannot start,
    /// [`ConnectError::Cancelled`] when `cancel` fires during a backoff, and
    /// [`ConnectError::Exhausted`] once every attempt failed.
    pub async fn connect(
        &self,
        host: &str,
        private_key: &PrivateKey,
        cancel: &CancellationToken,
    ) -> Result<RemoteSession<'_, R>, ConnectError> {
        let files = SessionFiles::create(private_key).map_err(ConnectError::Key)?;
        let session = RemoteSession {
            config: &self.config,
            runner: &self.runner,
            host: host.to_owned(),
            files,
        };

        let mut last_stderr = String::new();
        for attempt in 1..=self.max_attempts {
            let output = session.ssh(&["true"]).map_err(ConnectError::Spawn)?;
            if output.is_success() {
                info!(host, user = %self.config.user, attempt, "remote shell ready");
                return Ok(session);
            }

            last_stderr = output.stderr.trim().to_owned();
            warn!(
                host,
                attempt,
                max_attempts = self.max_attempts,
                status = %output.status_text(),
                stderr = %last_stderr,
                "remote shell not ready"
            );
            if attempt < self.max_attempts {
                pause(self.backoff, cancel)
                    .await
                    .map_err(|_| ConnectError::Cancelled)?;
            }
        }

        Err(ConnectError::Exhausted {
            host: host.to_owned(),
            user: self.config.user.clone(),
            attempts: self.max_attempts,
            last_stderr,
        })
    }
}

/// Authenticated, multiplexed shell session to one host.
#[derive(Debug)]
pub struct RemoteSession<'a, R: CommandRunner> {
    config: &'a ShellConfig,
    runner: &'a R,
    host: String,
    files: SessionFiles,
}

impl<R: CommandRunner> RemoteSession<'_, R> {
    /// Returns the remote host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Copies a local file to `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when `scp` cannot start or exits non-zero.
    pub fn upload(&self, local: &Utf8Path, remote_path: &str) -> Result<(), CommandError> {
        let mut args = self.common_options();
        args.push(OsString::from("-P"));
        args.push(OsString::from(self.config.port.to_string()));
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(format!("{}:{remote_path}", self.target())));

        let output = self.runner.run(&self.config.copy_bin, &args)?;
        if output.is_success() {
            info!(source = %local, destination = remote_path, "file delivered");
            return Ok(());
        }
        Err(CommandError::failed(&self.config.copy_bin, &output))
    }

    /// Runs `command` on the remote host and returns its captured output.
    ///
    /// The exit status is reported, not judged.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] when `ssh` cannot start.
    pub fn execute(&self, command: &str) -> Result<CommandOutput, CommandError> {
        self.ssh(&[command])
    }

    /// Stops the master connection and removes the key file.
    pub fn close(self) {
        let mut args = self.common_options();
        args.push(OsString::from("-O"));
        args.push(OsString::from("exit"));
        args.push(OsString::from(self.target()));
        match self.runner.run(&self.config.client_bin, &args) {
            Ok(output) if output.is_success() => {
                debug!(host = %self.host, "master connection closed");
            }
            Ok(output) => debug!(
                host = %self.host,
                status = %output.status_text(),
                "master connection already gone"
            ),
            Err(err) => {
                debug!(host = %self.host, error = %err, "could not close master connection");
            }
        }
    }

    fn ssh(&self, remote_args: &[&str]) -> Result<CommandOutput, CommandError> {
        let mut args = self.common_options();
        args.push(OsString::from("-p"));
        args.push(OsString::from(self.config.port.to_string()));
        args.push(OsString::from(self.target()));
        args.extend(remote_args.iter().map(OsString::from));
        self.runner.run(&self.config.client_bin, &args)
    }

    fn target(&self) -> String {
        format!("{}@{}", self.config.user, self.host)
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(self.files.key_path().as_str()),
            OsString::from("-o"),
            OsString::from("IdentitiesOnly=yes"),
        ];

        if self.config.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args.extend([
            OsString::from("-o"),
            OsString::from(format!("ConnectTimeout={}", self.config.connect_timeout_secs)),
            OsString::from("-o"),
            OsString::from("ControlMaster=auto"),
            OsString::from("-o"),
            OsString::from(format!("ControlPath={}", self.files.control_path())),
            OsString::from("-o"),
            OsString::from(format!("ControlPersist={}", self.config.control_persist_secs)),
        ]);
        args
    }
}
