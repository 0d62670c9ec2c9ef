//! Core library for the lr-runner load-test orchestrator.
//!
//! The crate provisions an ephemeral OpenStack environment behind a
//! [`Backend`] abstraction, runs a two-pass load test on the booted instance
//! over the system `ssh` client, and releases every resource it created.
//! [`RunOrchestrator`] sequences one run; [`OpenStackBackend`] is the
//! production backend.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod context;
pub mod openstack;
pub mod pause;
pub mod poll;
pub mod provision;
pub mod remote;
pub mod run;
pub mod teardown;
pub mod template;
pub mod test_support;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use backend::{Backend, BackendFuture, Identity};
pub use config::{ConfigError, OpenStackConfig, RunnerConfig};
pub use context::{ManagementNetwork, RunContext, RunId, RunIdError};
pub use openstack::{OpenStackBackend, OpenStackError};
pub use poll::{PollError, ReadinessPoller};
pub use provision::{CreatedResources, ProvisionError, ResourceKind, ResourceProvisioner};
pub use remote::{
    CommandRunner, ConnectError, ExecError, ProcessCommandRunner, RemoteExecutionRunner,
    SecureShellConnector, ShellConfig,
};
pub use run::{RunError, RunOrchestrator, RunReport, RunSummary};
pub use teardown::{TeardownCoordinator, TeardownReport};
pub use template::{TemplateError, TemplateVars};
