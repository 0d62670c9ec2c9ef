//! Unit tests for the teardown order and failure tolerance.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio::time::Instant;

use super::*;
use crate::backend::{Backend, FlavorSpec, ImageSpec, ServerRequest};
use crate::test_support::FakeCloud;

fn resource(id: String, name: &str) -> Option<ResourceRef> {
    Some(ResourceRef {
        id,
        name: name.to_owned(),
    })
}

async fn populated(cloud: &FakeCloud) -> CreatedResources {
    let keypair = cloud.create_keypair("lr-key-r1").await.expect("keypair");
    let group = cloud.create_security_group("lr-sg-r1").await.expect("group");
    let flavor = |name: &str| FlavorSpec {
        name: name.to_owned(),
        ram_mb: 1024,
        vcpus: 1,
        disk_gb: 20,
    };
    let runner_flavor = cloud
        .create_flavor(&flavor("lr-flavor-lr-r1"))
        .await
        .expect("runner flavor");
    let agent_flavor = cloud
        .create_flavor(&flavor("lr-flavor-agent-r1"))
        .await
        .expect("agent flavor");
    let image = |name: &str| ImageSpec {
        name: name.to_owned(),
        disk_format: String::from("qcow2"),
        container_format: String::from("bare"),
    };
    let runner_image = cloud
        .create_image(&image("loadrunner-r1"))
        .await
        .expect("runner image");
    let agent_image = cloud.create_image(&image("agent-r1")).await.expect("agent image");
    let server = cloud
        .boot_server(&ServerRequest {
            name: String::from("loadrunner-r1"),
            image_id: runner_image.id.clone(),
            flavor_id: runner_flavor.id.clone(),
            key_name: keypair.name.clone(),
            security_group: group.name.clone(),
            network_id: String::from("net-1"),
        })
        .await
        .expect("server");

    CreatedResources {
        keypair: resource(keypair.name.clone(), &keypair.name),
        security_group: resource(group.id, &group.name),
        runner_flavor: resource(runner_flavor.id, &runner_flavor.name),
        agent_flavor: resource(agent_flavor.id, &agent_flavor.name),
        runner_image: resource(runner_image.id, &runner_image.name),
        agent_image: resource(agent_image.id, &agent_image.name),
        instance: resource(server.id, &server.name),
    }
}

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

fn released_operations(cloud: &FakeCloud) -> Vec<&'static str> {
    cloud.releases().iter().map(|call| call.operation).collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn full_ledger_is_released_in_order_with_settle_delay(cloud: FakeCloud) {
    let ledger = populated(&cloud).await;

    let start = Instant::now();
    let report = TeardownCoordinator::new(&cloud).release(&ledger).await;

    assert!(report.is_clean());
    assert_eq!(start.elapsed(), DEFAULT_SETTLE_DELAY);
    assert_eq!(
        released_operations(&cloud),
        [
            "delete_server",
            "delete_image",
            "delete_flavor",
            "delete_image",
            "delete_flavor",
            "delete_keypair",
            "delete_security_group",
        ]
    );
    let kinds: Vec<ResourceKind> = report.released.iter().map(|(kind, _)| *kind).collect();
    let mut expected = RELEASE_ORDER.to_vec();
    expected.push(ResourceKind::SecurityGroup);
    assert_eq!(kinds, expected);
    assert!(cloud.live_resources().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn security_group_skips_settle_without_instance(cloud: FakeCloud) {
    let mut ledger = populated(&cloud).await;
    ledger.instance = None;

    let start = Instant::now();
    let report = TeardownCoordinator::new(&cloud).release(&ledger).await;

    assert!(report.is_clean());
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!released_operations(&cloud).contains(&"delete_server"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_instance_release_still_waits_before_security_group(cloud: FakeCloud) {
    let ledger = populated(&cloud).await;
    cloud.fail_on("delete_server");

    let start = Instant::now();
    let report = TeardownCoordinator::new(&cloud).release(&ledger).await;

    assert!(start.elapsed() >= DEFAULT_SETTLE_DELAY);
    assert_eq!(report.failures.len(), 1);
    assert!(
        report
            .failures
            .first()
            .is_some_and(|failure| failure.kind == ResourceKind::Instance)
    );
    assert_eq!(
        released_operations(&cloud).last(),
        Some(&"delete_security_group")
    );
    assert!(
        report
            .released
            .iter()
            .any(|(kind, _)| *kind == ResourceKind::SecurityGroup)
    );
}

#[rstest]
#[tokio::test]
async fn failures_are_recorded_and_do_not_stop_teardown(cloud: FakeCloud) {
    let ledger = populated(&cloud).await;
    cloud.fail_on("delete_image");

    let report = TeardownCoordinator::new(&cloud)
        .with_settle_delay(Duration::from_millis(1))
        .release(&ledger)
        .await;

    assert_eq!(report.failures.len(), 2);
    assert!(
        report
            .failures
            .iter()
            .all(|failure| matches!(
                failure.kind,
                ResourceKind::AgentImage | ResourceKind::RunnerImage
            ))
    );
    assert_eq!(report.released.len(), 5);
    assert_eq!(
        released_operations(&cloud).last(),
        Some(&"delete_security_group")
    );
}

#[rstest]
#[tokio::test]
async fn only_ledger_entries_are_released(cloud: FakeCloud) {
    let keypair = cloud.create_keypair("lr-key-r2").await.expect("keypair");
    let ledger = CreatedResources {
        keypair: resource(keypair.name.clone(), &keypair.name),
        ..CreatedResources::default()
    };

    let report = TeardownCoordinator::new(&cloud).release(&ledger).await;

    assert!(report.is_clean());
    assert_eq!(released_operations(&cloud), ["delete_keypair"]);
}

#[rstest]
#[tokio::test]
async fn empty_ledger_makes_no_calls(cloud: FakeCloud) {
    let report = TeardownCoordinator::new(&cloud)
        .release(&CreatedResources::default())
        .await;

    assert!(report.is_clean());
    assert!(report.released.is_empty());
    assert!(cloud.calls().is_empty());
}

#[rstest]
fn failure_display_names_the_resource() {
    let failure = TeardownFailure {
        kind: ResourceKind::RunnerImage,
        resource: ResourceRef {
            id: String::from("image-4"),
            name: String::from("loadrunner-r1"),
        },
        message: String::from("conflict"),
    };
    assert_eq!(
        failure.to_string(),
        "failed to release runner image loadrunner-r1 (image-4): conflict"
    );
}
