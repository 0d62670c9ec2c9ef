//! BDD scenarios for the run lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Complete a run and release every resource"
)]
fn scenario_complete_run(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Release the keypair when security group creation fails"
)]
fn scenario_security_group_failure(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Cancel while the instance boots and still tear down"
)]
fn scenario_cancel_during_boot(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Refuse to start without a management network"
)]
fn scenario_missing_network(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Surface unreachable instances and still tear down"
)]
fn scenario_unreachable_instance(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Keep going when a test pass exits non-zero"
)]
fn scenario_failing_pass(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
