//! BDD step definitions for the `lr-runner run` lifecycle.

use std::time::Duration;

use lr_runner::test_support::{
    FakeCloud, FakeCloudError, ScriptedRunner, expected_logs, openstack_config,
    script_successful_session, shell_config,
};
use lr_runner::{RunError, RunId, RunOrchestrator, SecureShellConnector};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FailureKind, LifecycleContext, LifecycleResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a ready cloud and shell session")]
fn ready_cloud(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
}

#[given("the remote session succeeds")]
fn remote_session_succeeds(lifecycle_context: LifecycleContext) -> LifecycleContext {
    script_successful_session(&lifecycle_context.runner);
    lifecycle_context
}

#[given("the cloud rejects \"{operation}\"")]
fn cloud_rejects(lifecycle_context: LifecycleContext, operation: String) -> LifecycleContext {
    lifecycle_context.cloud.fail_on(&operation);
    lifecycle_context
}

#[given("the run is cancelled when \"{operation}\" is called")]
fn cancelled_on(lifecycle_context: LifecycleContext, operation: String) -> LifecycleContext {
    lifecycle_context
        .cloud
        .cancel_on(&operation, lifecycle_context.cancel.clone());
    lifecycle_context
}

#[given("no management network is configured")]
fn no_management_network(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.config.management_net_name = None;
    lifecycle_context.config.management_net_id = None;
    lifecycle_context
}

#[given("the instance never accepts connections")]
fn never_accepts_connections(lifecycle_context: LifecycleContext) -> LifecycleContext {
    for _ in 0..CONNECT_ATTEMPTS {
        lifecycle_context.runner.push_failure(255);
    }
    lifecycle_context
}

#[given("the first test pass exits with code \"{code}\"")]
fn first_pass_exits(lifecycle_context: LifecycleContext, code: i32) -> LifecycleContext {
    let runner = &lifecycle_context.runner;
    runner.push_success();
    runner.push_success();
    runner.push_success();
    runner.push_output(Some(0), "installed\n", "");
    runner.push_output(Some(code), "", "pass failed\n");
    runner.push_output(Some(0), "pass 2 results\n", "");
    runner.push_success();
    lifecycle_context
}

const CONNECT_ATTEMPTS: u32 = 3;

#[when("I execute a run with id \"{run_id}\"")]
fn execute_run(
    lifecycle_context: LifecycleContext,
    run_id: String,
) -> Result<LifecycleContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let run_id = RunId::new(run_id).map_err(|err| StepError::Assertion(err.to_string()))?;
    let connector = SecureShellConnector::new(shell_config(), lifecycle_context.runner.clone())
        .with_backoff(Duration::ZERO)
        .with_max_attempts(CONNECT_ATTEMPTS);
    let orchestrator: RunOrchestrator<FakeCloud, ScriptedRunner> = RunOrchestrator::new(
        lifecycle_context.cloud.clone(),
        openstack_config(),
        lifecycle_context.config.clone(),
        connector,
    )
    .with_cancellation(lifecycle_context.cancel.clone())
    .with_poll_interval(Duration::ZERO)
    .with_cooldown(Duration::ZERO)
    .with_settle_delay(Duration::ZERO);

    let report = runtime.block_on(async move { orchestrator.execute(run_id).await });
    let outcome = match report.outcome {
        Ok(summary) => LifecycleResult::Success {
            address: summary.address,
            first_pass_exit: summary.execution.first_pass.exit_code,
        },
        Err(err) => LifecycleResult::Failure {
            kind: map_failure_kind(&err),
            message: err.to_string(),
        },
    };

    Ok(LifecycleContext {
        outcome: Some(outcome),
        ..lifecycle_context
    })
}

#[then("the run succeeds with address \"{address}\"")]
fn run_succeeds(lifecycle_context: &LifecycleContext, address: String) -> Result<(), StepError> {
    match &lifecycle_context.outcome {
        Some(LifecycleResult::Success { address: actual, .. }) if *actual == address => Ok(()),
        Some(LifecycleResult::Success { address: actual, .. }) => Err(StepError::Assertion(
            format!("expected address {address}, got {actual}"),
        )),
        Some(LifecycleResult::Failure { message, .. }) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run fails with kind \"{kind}\"")]
fn run_fails_with(lifecycle_context: &LifecycleContext, kind: String) -> Result<(), StepError> {
    let expected = parse_failure_kind(&kind)?;
    let Some(LifecycleResult::Failure { kind: actual, message }) = &lifecycle_context.outcome
    else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if *actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure kind {expected:?}, got {actual:?}: {message}"
        )))
    }
}

#[then("the run logs for \"{run_id}\" are written")]
fn run_logs_written(lifecycle_context: &LifecycleContext, run_id: String) -> Result<(), StepError> {
    let missing: Vec<String> = expected_logs(&run_id)
        .into_iter()
        .filter(|log| !lifecycle_context.workspace.contains(log))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("missing logs: {missing:?}")))
    }
}

#[then("the first pass exit code is \"{code}\"")]
fn first_pass_exit_code(lifecycle_context: &LifecycleContext, code: i32) -> Result<(), StepError> {
    match &lifecycle_context.outcome {
        Some(LifecycleResult::Success {
            first_pass_exit: Some(actual),
            ..
        }) if *actual == code => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected first pass exit code {code}, got {other:?}"
        ))),
    }
}

#[then("\"{operation}\" was called")]
fn operation_called(lifecycle_context: &LifecycleContext, operation: String) -> Result<(), StepError> {
    if was_called(&lifecycle_context.cloud, &operation) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{operation} should be invoked")))
    }
}

#[then("\"{operation}\" was not called")]
fn operation_not_called(
    lifecycle_context: &LifecycleContext,
    operation: String,
) -> Result<(), StepError> {
    if was_called(&lifecycle_context.cloud, &operation) {
        Err(StepError::Assertion(format!(
            "{operation} should not be invoked"
        )))
    } else {
        Ok(())
    }
}

#[then("no cloud resources remain")]
fn no_resources_remain(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let live = lifecycle_context.cloud.live_resources();
    if live.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("resources leaked: {live:?}")))
    }
}

#[then("the cloud was never contacted")]
fn cloud_never_contacted(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let calls = lifecycle_context.cloud.calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected calls: {calls:?}")))
    }
}

fn was_called(cloud: &FakeCloud, operation: &str) -> bool {
    cloud.calls().iter().any(|call| call.operation == operation)
}

const fn map_failure_kind(err: &RunError<FakeCloudError>) -> FailureKind {
    match err {
        RunError::Configuration(_) => FailureKind::Configuration,
        RunError::Identity(_) => FailureKind::Identity,
        RunError::Provision(_) => FailureKind::Provision,
        RunError::Connect(_) => FailureKind::Connect,
        RunError::Remote(_) => FailureKind::Remote,
        RunError::Artifact(_) => FailureKind::Artifact,
        RunError::Cancelled => FailureKind::Cancelled,
    }
}

fn parse_failure_kind(kind: &str) -> Result<FailureKind, StepError> {
    match kind {
        "configuration" => Ok(FailureKind::Configuration),
        "identity" => Ok(FailureKind::Identity),
        "provision" => Ok(FailureKind::Provision),
        "connect" => Ok(FailureKind::Connect),
        "remote" => Ok(FailureKind::Remote),
        "artifact" => Ok(FailureKind::Artifact),
        "cancelled" => Ok(FailureKind::Cancelled),
        _ => Err(StepError::Assertion(format!(
            "unknown failure kind: {kind}"
        ))),
    }
}
