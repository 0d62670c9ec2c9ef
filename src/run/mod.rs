//! Run control: sequences one load-test run and always tears down.
//!
//! [`RunOrchestrator`] owns the backend, the configuration layers, and the
//! shell connector. A run resolves the management network, provisions every
//! resource into a [`CreatedResources`] ledger, renders the configuration
//! artifacts, drives the remote passes, and finally hands the ledger to the
//! [`TeardownCoordinator`] whatever the outcome was.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::artifacts::{ArtifactError, ArtifactStore, read_local_file};
use crate::backend::Backend;
use crate::config::{OpenStackConfig, RunnerConfig};
use crate::context::{RunContext, RunId};
use crate::pause::checkpoint;
use crate::poll::{DEFAULT_POLL_INTERVAL, ReadinessPoller};
use crate::provision::{
    CreatedResources, ImageSources, NetworkSelector, ProvisionError, Provisioned,
    ResourceProvisioner, ResourceRef,
};
use crate::remote::{
    CommandRunner, ConnectError, DEFAULT_COOLDOWN, ExecError, ExecutionSummary,
    RemoteExecutionRunner, SETTINGS_REMOTE_PATH, SecureShellConnector,
    TEST_DEFINITION_REMOTE_PATH,
};
use crate::teardown::{DEFAULT_SETTLE_DELAY, TeardownCoordinator, TeardownReport};
use crate::template::TemplateVars;

/// Errors that end a run. Teardown has always run by the time one surfaces.
#[derive(Debug, Error)]
pub enum RunError<E>
where
    E: std::error::Error + 'static,
{
    /// Pre-flight or network resolution found the configuration unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Authentication against the identity service failed.
    #[error("identity request failed: {0}")]
    Identity(#[source] E),
    /// Provisioning stopped before the instance was reachable.
    #[error(transparent)]
    Provision(ProvisionError<E>),
    /// The instance never accepted a shell session.
    #[error(transparent)]
    Connect(ConnectError),
    /// Delivering the configuration or running a command failed.
    #[error(transparent)]
    Remote(ExecError),
    /// A template or generated file could not be read or written.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// The run was cancelled.
    #[error("run cancelled")]
    Cancelled,
}

impl<E> From<ProvisionError<E>> for RunError<E>
where
    E: std::error::Error + 'static,
{
    fn from(value: ProvisionError<E>) -> Self {
        match value {
            ProvisionError::Configuration(message) => Self::Configuration(message),
            ProvisionError::Artifact(err) => Self::Artifact(err),
            ProvisionError::Cancelled => Self::Cancelled,
            other => Self::Provision(other),
        }
    }
}

impl<E> From<ConnectError> for RunError<E>
where
    E: std::error::Error + 'static,
{
    fn from(value: ConnectError) -> Self {
        match value {
            ConnectError::Cancelled => Self::Cancelled,
            other => Self::Connect(other),
        }
    }
}

impl<E> From<ExecError> for RunError<E>
where
    E: std::error::Error + 'static,
{
    fn from(value: ExecError) -> Self {
        match value {
            ExecError::Cancelled => Self::Cancelled,
            ExecError::Artifact(err) => Self::Artifact(err),
            other => Self::Remote(other),
        }
    }
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Floating address the instance was reached on.
    pub address: String,
    /// Generated settings module.
    pub settings_file: Utf8PathBuf,
    /// Generated test definition.
    pub test_definition_file: Utf8PathBuf,
    /// Exit statuses and log files of the remote commands.
    pub execution: ExecutionSummary,
}

/// Outcome of one run together with its teardown report.
#[derive(Debug)]
pub struct RunReport<E>
where
    E: std::error::Error + 'static,
{
    /// Identifier shared by every resource and artifact of the run.
    pub run_id: RunId,
    /// Result of the provisioning and execution phases.
    pub outcome: Result<RunSummary, RunError<E>>,
    /// Resources the run had created when it stopped.
    pub created: CreatedResources,
    /// Result of releasing them.
    pub teardown: TeardownReport,
}

impl<E> RunReport<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the run itself succeeded. Teardown failures do
    /// not count against it.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Executes the run flow using the provided backend and shell connector.
#[derive(Debug)]
pub struct RunOrchestrator<B, R: CommandRunner> {
    backend: B,
    openstack: OpenStackConfig,
    runner: RunnerConfig,
    connector: SecureShellConnector<R>,
    cancel: CancellationToken,
    poll_interval: Duration,
    cooldown: Duration,
    settle_delay: Duration,
}

impl<B, R> RunOrchestrator<B, R>
where
    B: Backend,
    R: CommandRunner,
{
    /// Creates a new orchestrator with the default timings.
    #[must_use]
    pub fn new(
        backend: B,
        openstack: OpenStackConfig,
        runner: RunnerConfig,
        connector: SecureShellConnector<R>,
    ) -> Self {
        Self {
            backend,
            openstack,
            runner,
            connector,
            cancel: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Replaces the cancellation token observed by the run.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Overrides the instance status polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the pause between the two test passes.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Overrides the delay before the security group is deleted.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Returns the token that cancels the run when triggered.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the backend driving the run.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs the whole lifecycle for `run_id`.
    ///
    /// Never short-circuits past teardown: every resource recorded in the
    /// ledger is released before the report is returned, including after a
    /// cancellation.
    pub async fn execute(&self, run_id: RunId) -> RunReport<B::Error> {
        info!(
            run_id = %run_id,
            openstack = ?self.openstack,
            runner = ?self.runner,
            "starting run"
        );

        let mut created = CreatedResources::default();
        let outcome = self.drive(&run_id, &mut created).await;

        match &outcome {
            Ok(summary) => info!(run_id = %run_id, address = %summary.address, "run finished"),
            Err(err) => error!(run_id = %run_id, error = %err, "run failed; tearing down"),
        }

        let teardown = TeardownCoordinator::new(&self.backend)
            .with_settle_delay(self.settle_delay)
            .release(&created)
            .await;

        RunReport {
            run_id,
            outcome,
            created,
            teardown,
        }
    }

    async fn drive(
        &self,
        run_id: &RunId,
        created: &mut CreatedResources,
    ) -> Result<RunSummary, RunError<B::Error>> {
        let selector = NetworkSelector::from_config(&self.runner)
            .map_err(|err| RunError::Configuration(err.to_string()))?;
        let auth_url = self
            .openstack
            .resolved_auth_url()
            .map_err(|err| RunError::Configuration(err.to_string()))?;
        let artifacts = ArtifactStore::open(&self.runner.artifact_dir())?;
        checkpoint(&self.cancel).map_err(|_| RunError::Cancelled)?;

        let identity = self
            .backend
            .identity()
            .await
            .map_err(RunError::Identity)?;

        let poller = ReadinessPoller::new(Duration::from_secs(self.runner.boot_timeout_secs))
            .with_interval(self.poll_interval);
        let provisioner = ResourceProvisioner::new(&self.backend, poller, &self.cancel)
            .with_floating_ip_pool(self.runner.floating_ip_pool());
        let network = provisioner.resolve_network(&selector).await?;
        let ctx = RunContext::new(run_id.clone(), identity, network);

        let images = ImageSources {
            runner: Utf8Path::new(&self.runner.runner_image_path),
            agent: Utf8Path::new(&self.runner.agent_image_path),
        };
        let provisioned = provisioner.provision(&ctx, images, created).await?;
        checkpoint(&self.cancel).map_err(|_| RunError::Cancelled)?;

        let vars = self.template_vars(&ctx, &auth_url, created);
        let settings_file = render_artifact(
            &artifacts,
            Utf8Path::new(&self.runner.settings_template),
            &format!("settings.py.{run_id}"),
            &vars,
        )?;
        let test_definition_file = render_artifact(
            &artifacts,
            Utf8Path::new(&self.runner.test_template),
            &format!("test.yml.{run_id}"),
            &vars,
        )?;

        let execution = self
            .run_remote(
                &provisioned,
                &artifacts,
                run_id,
                &settings_file,
                &test_definition_file,
            )
            .await?;

        Ok(RunSummary {
            address: provisioned.address,
            settings_file,
            test_definition_file,
            execution,
        })
    }

    async fn run_remote(
        &self,
        provisioned: &Provisioned,
        artifacts: &ArtifactStore,
        run_id: &RunId,
        settings_file: &Utf8Path,
        test_definition_file: &Utf8Path,
    ) -> Result<ExecutionSummary, RunError<B::Error>> {
        let session = self
            .connector
            .connect(&provisioned.address, &provisioned.private_key, &self.cancel)
            .await?;

        let runner = RemoteExecutionRunner::new(artifacts, run_id, &self.runner.test_name)
            .with_cooldown(self.cooldown);
        let result = match runner.deliver(&session, settings_file, test_definition_file) {
            Ok(()) => runner.run_passes(&session, &self.cancel).await,
            Err(err) => Err(err),
        };
        session.close();
        result.map_err(RunError::from)
    }

    fn template_vars(
        &self,
        ctx: &RunContext,
        auth_url: &str,
        created: &CreatedResources,
    ) -> TemplateVars {
        let id_of = |entry: Option<&ResourceRef>| {
            entry.map(|resource| resource.id.clone()).unwrap_or_default()
        };
        let network = ctx.network();
        TemplateVars {
            controller_ip: controller_address(&self.openstack, auth_url),
            tenant_name: self.openstack.tenant_name.clone(),
            username: self.openstack.username.clone(),
            password: self.openstack.password.clone(),
            auth_url: auth_url.to_owned(),
            region: self.openstack.region.clone(),
            token: ctx.identity().token.clone(),
            management_net_name: network.name.clone(),
            management_net_cidr: network.cidr.clone(),
            management_net_id: network.id.clone(),
            agent_image_id: id_of(created.agent_image.as_ref()),
            agent_flavor_id: id_of(created.agent_flavor.as_ref()),
            test_name: self.runner.test_name.clone(),
            test_net_name: self.runner.test_net_name.clone(),
            iperf_args: self.runner.iperf_args.clone(),
            loadrunner_user: self.connector.config().user.clone(),
            runner_image_path: self.runner.runner_image_path.clone(),
            agent_image_path: self.runner.agent_image_path.clone(),
            ubuntu_image_url: self.runner.ubuntu_image_url.clone(),
            settings_template: self.runner.settings_template.clone(),
            settings_remote_path: String::from(SETTINGS_REMOTE_PATH),
            test_template: self.runner.test_template.clone(),
            test_remote_path: String::from(TEST_DEFINITION_REMOTE_PATH),
            run_id: ctx.run_id().to_string(),
        }
    }
}

/// Returns the configured controller address, falling back to the host of
/// the identity endpoint.
#[must_use]
pub fn controller_address(config: &OpenStackConfig, auth_url: &str) -> String {
    config
        .controller_ip
        .as_deref()
        .map(str::trim)
        .filter(|controller| !controller.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            reqwest::Url::parse(auth_url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_owned))
        })
        .unwrap_or_default()
}

fn render_artifact(
    artifacts: &ArtifactStore,
    template_path: &Utf8Path,
    output_name: &str,
    vars: &TemplateVars,
) -> Result<Utf8PathBuf, ArtifactError> {
    let template = read_local_file(template_path)?;
    let rendered = vars
        .render(&template)
        .map_err(|err| ArtifactError::Template {
            path: template_path.to_path_buf(),
            message: err.to_string(),
        })?;
    let path = artifacts.write(output_name, &rendered)?;
    info!(template = %template_path, output = %path, "configuration rendered");
    Ok(path)
}
