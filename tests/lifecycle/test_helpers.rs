//! Shared fixtures for run lifecycle BDD scenarios.

use std::sync::Arc;

use lr_runner::RunnerConfig;
use lr_runner::artifacts::ArtifactError;
use lr_runner::test_support::{FakeCloud, RunWorkspace, ScriptedRunner};
use rstest::fixture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub cloud: FakeCloud,
    pub runner: ScriptedRunner,
    pub config: RunnerConfig,
    pub cancel: CancellationToken,
    pub outcome: Option<LifecycleResult>,
    pub(crate) workspace: Arc<RunWorkspace>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Configuration,
    Identity,
    Provision,
    Connect,
    Remote,
    Artifact,
    Cancelled,
}

#[derive(Clone, Debug)]
pub enum LifecycleResult {
    Success {
        address: String,
        first_pass_exit: Option<i32>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

#[derive(Clone, Debug, Error)]
pub enum LifecycleTestError {
    #[error("failed to create workspace: {0}")]
    Workspace(String),
}

impl From<ArtifactError> for LifecycleTestError {
    fn from(err: ArtifactError) -> Self {
        Self::Workspace(err.to_string())
    }
}

#[fixture]
pub fn lifecycle_context_result() -> Result<LifecycleContext, LifecycleTestError> {
    build_lifecycle_context()
}

#[fixture]
pub fn lifecycle_context(
    lifecycle_context_result: Result<LifecycleContext, LifecycleTestError>,
) -> LifecycleContext {
    lifecycle_context_result
        .unwrap_or_else(|err| panic!("lifecycle context fixture should initialise: {err}"))
}

pub fn build_lifecycle_context() -> Result<LifecycleContext, LifecycleTestError> {
    let workspace = RunWorkspace::new()?;
    Ok(LifecycleContext {
        cloud: FakeCloud::new().with_server_statuses(&["BUILD", "ACTIVE"]),
        runner: ScriptedRunner::new(),
        config: workspace.config(),
        cancel: CancellationToken::new(),
        outcome: None,
        workspace: Arc::new(workspace),
    })
}
