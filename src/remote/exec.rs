//! Delivers generated configuration and runs the load test on the instance.

use std::time::Duration;

use camino::Utf8Path;
use shell_escape::unix::escape;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::context::RunId;
use crate::pause::pause;

use super::{CommandError, CommandRunner, RemoteSession};

/// Destination of the generated settings module.
pub const SETTINGS_REMOTE_PATH: &str = "/home/ubuntu/load_runner/load_runner/settings.py";

/// Destination of the generated test definition.
pub const TEST_DEFINITION_REMOTE_PATH: &str = "/home/ubuntu/load_runner/load_runner/test.yml";

/// Installs the load runner package for the remote user.
pub const INSTALL_COMMAND: &str = "cd /home/ubuntu/load_runner && python setup.py install --user";

/// Default pause between the two test passes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Builds the command running one test pass.
#[must_use]
pub fn test_command(test_name: &str) -> String {
    format!(
        "cd /home/ubuntu/load_runner/load_runner && python run.py -t {}",
        escape(test_name.into())
    )
}

/// Errors that abort remote execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A configuration file could not be copied to the instance.
    #[error("failed to deliver {file}: {source}")]
    Transfer {
        /// Remote destination.
        file: String,
        /// Underlying failure.
        #[source]
        source: CommandError,
    },
    /// A remote command could not be started.
    #[error("remote command `{label}` could not run: {source}")]
    Command {
        /// Label of the command.
        label: String,
        /// Underlying failure.
        #[source]
        source: CommandError,
    },
    /// Writing a log file failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// The run was cancelled during the cooldown.
    #[error("remote execution cancelled")]
    Cancelled,
}

/// Exit status and log files of one remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedCommand {
    /// Label used in log names (`setup`, `run-pass-1`, ...).
    pub label: String,
    /// Exit code, when the command terminated normally.
    pub exit_code: Option<i32>,
    /// File holding standard output.
    pub stdout_log: String,
    /// File holding standard error.
    pub stderr_log: String,
}

impl RecordedCommand {
    /// Returns `true` when the command exited zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Outcome of the install step and both passes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionSummary {
    /// Install step.
    pub setup: RecordedCommand,
    /// First pass.
    pub first_pass: RecordedCommand,
    /// Second pass, after the cooldown.
    pub second_pass: RecordedCommand,
}

impl ExecutionSummary {
    /// Iterates the three recorded commands in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &RecordedCommand> {
        [&self.setup, &self.first_pass, &self.second_pass].into_iter()
    }
}

/// Runs the install command and both test passes over one session.
#[derive(Debug)]
pub struct RemoteExecutionRunner<'a> {
    artifacts: &'a ArtifactStore,
    run_id: &'a RunId,
    test_name: &'a str,
    cooldown: Duration,
}

impl<'a> RemoteExecutionRunner<'a> {
    /// Creates a runner writing logs into `artifacts`.
    #[must_use]
    pub const fn new(artifacts: &'a ArtifactStore, run_id: &'a RunId, test_name: &'a str) -> Self {
        Self {
            artifacts,
            run_id,
            test_name,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Overrides the pause between passes.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Copies the settings module and test definition onto the instance.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Transfer`] when either copy fails.
    pub fn deliver<R: CommandRunner>(
        &self,
        session: &RemoteSession<'_, R>,
        settings: &Utf8Path,
        test_definition: &Utf8Path,
    ) -> Result<(), ExecError> {
        for (local, remote) in [
            (settings, SETTINGS_REMOTE_PATH),
            (test_definition, TEST_DEFINITION_REMOTE_PATH),
        ] {
            session
                .upload(local, remote)
                .map_err(|source| ExecError::Transfer {
                    file: remote.to_owned(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Runs `command` and writes both streams to run-labelled logs.
    ///
    /// A non-zero exit is logged at warn level and returned, never raised.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Command`] when `ssh` cannot start and
    /// [`ExecError::Artifact`] when a log cannot be written.
    pub fn run_recorded<R: CommandRunner>(
        &self,
        session: &RemoteSession<'_, R>,
        label: &str,
        command: &str,
    ) -> Result<RecordedCommand, ExecError> {
        info!(label, command, "running remote command");
        let output = session
            .execute(command)
            .map_err(|source| ExecError::Command {
                label: label.to_owned(),
                source,
            })?;

        let stdout_log = format!("{label}-stdout-{}.log", self.run_id);
        let stderr_log = format!("{label}-stderr-{}.log", self.run_id);
        self.artifacts.write(&stdout_log, &output.stdout)?;
        self.artifacts.write(&stderr_log, &output.stderr)?;

        if output.is_success() {
            info!(label, "remote command succeeded");
        } else {
            warn!(
                label,
                status = %output.status_text(),
                stderr_log = %stderr_log,
                "remote command exited non-zero"
            );
        }

        Ok(RecordedCommand {
            label: label.to_owned(),
            exit_code: output.code,
            stdout_log,
            stderr_log,
        })
    }

    /// Installs the package, runs pass 1, waits the cooldown, runs pass 2.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Cancelled`] when `cancel` fires during the
    /// cooldown, and propagates [`RemoteExecutionRunner::run_recorded`]
    /// errors.
    pub async fn run_passes<R: CommandRunner>(
        &self,
        session: &RemoteSession<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary, ExecError> {
        let setup = self.run_recorded(session, "setup", INSTALL_COMMAND)?;
        let command = test_command(self.test_name);
        let first_pass = self.run_recorded(session, "run-pass-1", &command)?;

        info!(cooldown_secs = self.cooldown.as_secs(), "cooling down between passes");
        pause(self.cooldown, cancel)
            .await
            .map_err(|_| ExecError::Cancelled)?;

        let second_pass = self.run_recorded(session, "run-pass-2", &command)?;
        Ok(ExecutionSummary {
            setup,
            first_pass,
            second_pass,
        })
    }
}
