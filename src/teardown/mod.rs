//! Best-effort release of everything a run created.
//!
//! [`TeardownCoordinator`] walks the ledger in a fixed reverse-dependency
//! order. Each release is attempted once; failures are logged and collected
//! in the [`TeardownReport`] while the remaining releases continue.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::provision::{CreatedResources, ResourceKind, ResourceRef};

/// Delay between releasing the instance and deleting its security group.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Release order, security group excluded (it follows the settle delay).
pub const RELEASE_ORDER: [ResourceKind; 6] = [
    ResourceKind::Instance,
    ResourceKind::AgentImage,
    ResourceKind::AgentFlavor,
    ResourceKind::RunnerImage,
    ResourceKind::RunnerFlavor,
    ResourceKind::Keypair,
];

/// A release that failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Resource that could not be released.
    pub resource: ResourceRef,
    /// Provider error text.
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to release {} {} ({}): {}",
            self.kind, self.resource.name, self.resource.id, self.message
        )
    }
}

/// Outcome of a teardown pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// Resources released, in release order.
    pub released: Vec<(ResourceKind, ResourceRef)>,
    /// Releases that failed.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Returns `true` when every release succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Releases ledger entries through a backend.
#[derive(Debug)]
pub struct TeardownCoordinator<'a, B> {
    backend: &'a B,
    settle_delay: Duration,
}

impl<'a, B> TeardownCoordinator<'a, B>
where
    B: Backend,
{
    /// Creates a coordinator with the default settle delay.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self {
            backend,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Releases every resource recorded in `ledger`.
    ///
    /// Not cancellable. The settle delay runs in full before the security
    /// group is deleted whenever the ledger holds an instance, whether or not
    /// its release succeeded.
    pub async fn release(&self, ledger: &CreatedResources) -> TeardownReport {
        let mut report = TeardownReport::default();

        for kind in RELEASE_ORDER {
            if let Some(resource) = ledger.get(kind) {
                self.release_one(kind, resource, &mut report).await;
            }
        }

        if let Some(group) = ledger.get(ResourceKind::SecurityGroup) {
            if ledger.get(ResourceKind::Instance).is_some() {
                info!(
                    delay_secs = self.settle_delay.as_secs(),
                    "waiting before security group removal"
                );
                tokio::time::sleep(self.settle_delay).await;
            }
            self.release_one(ResourceKind::SecurityGroup, group, &mut report)
                .await;
        }

        if report.is_clean() {
            info!(released = report.released.len(), "teardown complete");
        } else {
            warn!(
                released = report.released.len(),
                failed = report.failures.len(),
                "teardown finished with failures"
            );
        }
        report
    }

    async fn release_one(
        &self,
        kind: ResourceKind,
        resource: &ResourceRef,
        report: &mut TeardownReport,
    ) {
        let id = resource.id.as_str();
        let result = match kind {
            ResourceKind::Instance => self.backend.delete_server(id).await,
            ResourceKind::AgentImage | ResourceKind::RunnerImage => {
                self.backend.delete_image(id).await
            }
            ResourceKind::AgentFlavor | ResourceKind::RunnerFlavor => {
                self.backend.delete_flavor(id).await
            }
            ResourceKind::Keypair => self.backend.delete_keypair(id).await,
            ResourceKind::SecurityGroup => self.backend.delete_security_group(id).await,
        };

        match result {
            Ok(()) => {
                info!(kind = kind.label(), name = %resource.name, id, "resource released");
                report.released.push((kind, resource.clone()));
            }
            Err(err) => {
                warn!(
                    kind = kind.label(),
                    name = %resource.name,
                    id,
                    error = %err,
                    "failed to release resource"
                );
                report.failures.push(TeardownFailure {
                    kind,
                    resource: resource.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests;
