//! Creation of the per-run cloud resources.
//!
//! [`ResourceProvisioner`] creates, in dependency order, the keypair, the
//! security group and its rules, both sizing profiles, both images, and the
//! instance, then binds a free floating IP to it. Every resource is written
//! to the [`CreatedResources`] ledger the moment the cloud acknowledges it,
//! so a failure at any later step still leaves teardown a complete record.

use std::fmt;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artifacts::{ArtifactError, ensure_readable};
use crate::backend::{
    Backend, FlavorSpec, FloatingIp, ImageSpec, IngressRule, PrivateKey, Protocol, Server,
    ServerRequest,
};
use crate::context::{ManagementNetwork, RunContext};
use crate::pause::checkpoint;
use crate::poll::{PollError, ReadinessPoller, SERVER_BOOT};

mod network;

pub use network::NetworkSelector;

/// Keypair name prefix.
pub const KEYPAIR_PREFIX: &str = "lr-key";
/// Security group name prefix.
pub const SECURITY_GROUP_PREFIX: &str = "lr-sg";
/// Runner sizing profile name prefix.
pub const RUNNER_FLAVOR_PREFIX: &str = "lr-flavor-lr";
/// Agent sizing profile name prefix.
pub const AGENT_FLAVOR_PREFIX: &str = "lr-flavor-agent";
/// Runner image and instance name prefix.
pub const RUNNER_PREFIX: &str = "loadrunner";
/// Agent image name prefix.
pub const AGENT_IMAGE_PREFIX: &str = "agent";

const RUNNER_RAM_MB: u32 = 4096;
const RUNNER_VCPUS: u32 = 2;
const AGENT_RAM_MB: u32 = 2048;
const AGENT_VCPUS: u32 = 1;
const DISK_GB: u32 = 20;
const OPEN_CIDR: &str = "0.0.0.0/0";

/// Kinds of resources a run creates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// Compute instance.
    Instance,
    /// Agent disk image.
    AgentImage,
    /// Agent sizing profile.
    AgentFlavor,
    /// Runner disk image.
    RunnerImage,
    /// Runner sizing profile.
    RunnerFlavor,
    /// Keypair.
    Keypair,
    /// Security group.
    SecurityGroup,
}

impl ResourceKind {
    /// Human readable label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::AgentImage => "agent image",
            Self::AgentFlavor => "agent flavor",
            Self::RunnerImage => "runner image",
            Self::RunnerFlavor => "runner flavor",
            Self::Keypair => "keypair",
            Self::SecurityGroup => "security group",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifier and name of a created resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRef {
    /// Cloud identifier (the name, for keypairs).
    pub id: String,
    /// Resource name.
    pub name: String,
}

impl ResourceRef {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ledger of everything the provisioner has created so far.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreatedResources {
    /// Generated keypair.
    pub keypair: Option<ResourceRef>,
    /// Security group.
    pub security_group: Option<ResourceRef>,
    /// Runner sizing profile.
    pub runner_flavor: Option<ResourceRef>,
    /// Agent sizing profile.
    pub agent_flavor: Option<ResourceRef>,
    /// Runner image.
    pub runner_image: Option<ResourceRef>,
    /// Agent image.
    pub agent_image: Option<ResourceRef>,
    /// Booted instance.
    pub instance: Option<ResourceRef>,
}

impl CreatedResources {
    /// Returns the entry for `kind`.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> Option<&ResourceRef> {
        match kind {
            ResourceKind::Instance => self.instance.as_ref(),
            ResourceKind::AgentImage => self.agent_image.as_ref(),
            ResourceKind::AgentFlavor => self.agent_flavor.as_ref(),
            ResourceKind::RunnerImage => self.runner_image.as_ref(),
            ResourceKind::RunnerFlavor => self.runner_flavor.as_ref(),
            ResourceKind::Keypair => self.keypair.as_ref(),
            ResourceKind::SecurityGroup => self.security_group.as_ref(),
        }
    }

    /// Returns `true` when nothing has been created.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.keypair.is_none()
            && self.security_group.is_none()
            && self.runner_flavor.is_none()
            && self.agent_flavor.is_none()
            && self.runner_image.is_none()
            && self.agent_image.is_none()
            && self.instance.is_none()
    }

    const fn slot(&mut self, kind: ResourceKind) -> &mut Option<ResourceRef> {
        match kind {
            ResourceKind::Instance => &mut self.instance,
            ResourceKind::AgentImage => &mut self.agent_image,
            ResourceKind::AgentFlavor => &mut self.agent_flavor,
            ResourceKind::RunnerImage => &mut self.runner_image,
            ResourceKind::RunnerFlavor => &mut self.runner_flavor,
            ResourceKind::Keypair => &mut self.keypair,
            ResourceKind::SecurityGroup => &mut self.security_group,
        }
    }

    fn record(&mut self, kind: ResourceKind, resource: ResourceRef) {
        info!(kind = kind.label(), name = %resource.name, id = %resource.id, "resource created");
        *self.slot(kind) = Some(resource);
    }
}

/// Errors raised while provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    /// The configuration does not identify a usable network.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A resource entered its failure state.
    #[error("{resource} entered failure state {state}")]
    ProvisioningFailed {
        /// Label of the resource.
        resource: String,
        /// Observed state.
        state: String,
    },
    /// A resource did not settle within its bound.
    #[error("{resource} still {last_state} after {waited:?}")]
    Timeout {
        /// Label of the resource.
        resource: String,
        /// Time spent waiting.
        waited: Duration,
        /// Last observed state.
        last_state: String,
    },
    /// No free floating IP was available.
    #[error("no free floating IP available (pool: {})", .pool.as_deref().unwrap_or("any"))]
    ResourceExhausted {
        /// Pool restriction in force, if any.
        pool: Option<String>,
    },
    /// A control-plane call failed.
    #[error("{action} failed: {source}")]
    Cloud {
        /// Backend operation that failed.
        action: &'static str,
        /// Provider error.
        #[source]
        source: E,
    },
    /// A local image file is missing or unreadable.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// The run was cancelled.
    #[error("provisioning cancelled")]
    Cancelled,
}

impl<E> From<PollError<E>> for ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    fn from(value: PollError<E>) -> Self {
        match value {
            PollError::Failed { resource, state } => Self::ProvisioningFailed { resource, state },
            PollError::Timeout {
                resource,
                waited,
                last_state,
            } => Self::Timeout {
                resource,
                waited,
                last_state,
            },
            PollError::Fetch(source) => Self::Cloud {
                action: "get_server",
                source,
            },
            PollError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

fn cloud<E>(action: &'static str) -> impl FnOnce(E) -> ProvisionError<E>
where
    E: std::error::Error + 'static,
{
    move |source| ProvisionError::Cloud { action, source }
}

/// Result of a successful provisioning sequence.
#[derive(Clone, Debug)]
pub struct Provisioned {
    /// Instance record in its ready state.
    pub server: Server,
    /// Routable address bound to the instance.
    pub address: String,
    /// Private key of the generated keypair.
    pub private_key: PrivateKey,
}

/// Ingress rules applied to the run's security group.
#[must_use]
pub fn ingress_rules() -> [IngressRule; 3] {
    [
        IngressRule {
            protocol: Protocol::Tcp,
            from_port: 1,
            to_port: 65535,
            cidr: String::from(OPEN_CIDR),
        },
        IngressRule {
            protocol: Protocol::Udp,
            from_port: 1,
            to_port: 65535,
            cidr: String::from(OPEN_CIDR),
        },
        IngressRule {
            protocol: Protocol::Icmp,
            from_port: -1,
            to_port: -1,
            cidr: String::from(OPEN_CIDR),
        },
    ]
}

/// Local image files uploaded by the provisioner.
#[derive(Clone, Copy, Debug)]
pub struct ImageSources<'a> {
    /// Runner disk image.
    pub runner: &'a Utf8Path,
    /// Agent disk image.
    pub agent: &'a Utf8Path,
}

/// Creates every resource of a run in dependency order.
#[derive(Debug)]
pub struct ResourceProvisioner<'a, B> {
    backend: &'a B,
    poller: ReadinessPoller,
    cancel: &'a CancellationToken,
    floating_ip_pool: Option<&'a str>,
}

impl<'a, B> ResourceProvisioner<'a, B>
where
    B: Backend,
{
    /// Creates a provisioner bound to one backend and cancellation token.
    #[must_use]
    pub const fn new(
        backend: &'a B,
        poller: ReadinessPoller,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            backend,
            poller,
            cancel,
            floating_ip_pool: None,
        }
    }

    /// Restricts floating IP allocation to `pool`.
    #[must_use]
    pub const fn with_floating_ip_pool(mut self, pool: Option<&'a str>) -> Self {
        self.floating_ip_pool = pool;
        self
    }

    /// Resolves the management network named by `selector`.
    ///
    /// The CIDR comes from the override when configured, otherwise from the
    /// network's first subnet.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Configuration`] when no network matches the
    /// name or the network has no subnet to derive a CIDR from, and
    /// [`ProvisionError::Cloud`] when a lookup fails.
    pub async fn resolve_network(
        &self,
        selector: &NetworkSelector,
    ) -> Result<ManagementNetwork, ProvisionError<B::Error>> {
        let network = match selector {
            NetworkSelector::ById { id, .. } => self
                .backend
                .show_network(id)
                .await
                .map_err(cloud("show_network"))?,
            NetworkSelector::ByName { name, .. } => self
                .backend
                .find_networks(name)
                .await
                .map_err(cloud("find_networks"))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    ProvisionError::Configuration(format!("no network named {name}"))
                })?,
        };

        let cidr = if let Some(cidr) = selector.cidr_override() {
            cidr.to_owned()
        } else {
            let subnet_id = network.subnets.first().ok_or_else(|| {
                ProvisionError::Configuration(format!(
                    "network {} has no subnets; set LR_MANAGEMENT_NET_CIDR",
                    network.name
                ))
            })?;
            self.backend
                .show_subnet(subnet_id)
                .await
                .map_err(cloud("show_subnet"))?
                .cidr
        };

        info!(id = %network.id, name = %network.name, cidr = %cidr, "management network resolved");
        Ok(ManagementNetwork {
            id: network.id,
            name: network.name,
            cidr,
        })
    }

    /// Runs the full creation sequence, recording each resource in `ledger`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] encountered; everything created
    /// before it is already in `ledger`.
    pub async fn provision(
        &self,
        ctx: &RunContext,
        images: ImageSources<'_>,
        ledger: &mut CreatedResources,
    ) -> Result<Provisioned, ProvisionError<B::Error>> {
        let private_key = self.create_keypair(ctx, ledger).await?;
        self.step()?;
        self.create_security_group(ctx, ledger).await?;
        self.step()?;
        let runner_flavor = self
            .create_flavor(ctx, ledger, ResourceKind::RunnerFlavor)
            .await?;
        self.step()?;
        self.create_flavor(ctx, ledger, ResourceKind::AgentFlavor)
            .await?;
        self.step()?;
        let runner_image = self
            .create_image(ctx, ledger, ResourceKind::RunnerImage, images.runner)
            .await?;
        self.step()?;
        self.create_image(ctx, ledger, ResourceKind::AgentImage, images.agent)
            .await?;
        self.step()?;
        let server = self
            .boot_instance(ctx, ledger, &runner_image, &runner_flavor)
            .await?;
        self.step()?;
        let address = self.assign_address(&server).await?;

        Ok(Provisioned {
            server,
            address,
            private_key,
        })
    }

    fn step(&self) -> Result<(), ProvisionError<B::Error>> {
        checkpoint(self.cancel).map_err(|_| ProvisionError::Cancelled)
    }

    async fn create_keypair(
        &self,
        ctx: &RunContext,
        ledger: &mut CreatedResources,
    ) -> Result<PrivateKey, ProvisionError<B::Error>> {
        let name = ctx.run_id().scoped(KEYPAIR_PREFIX);
        let keypair = self
            .backend
            .create_keypair(&name)
            .await
            .map_err(cloud("create_keypair"))?;
        // Nova addresses keypairs by name, so the name doubles as the id.
        ledger.record(
            ResourceKind::Keypair,
            ResourceRef::new(keypair.name.clone(), keypair.name),
        );
        Ok(keypair.private_key)
    }

    async fn create_security_group(
        &self,
        ctx: &RunContext,
        ledger: &mut CreatedResources,
    ) -> Result<(), ProvisionError<B::Error>> {
        let name = ctx.run_id().scoped(SECURITY_GROUP_PREFIX);
        let group = self
            .backend
            .create_security_group(&name)
            .await
            .map_err(cloud("create_security_group"))?;
        let group_id = group.id.clone();
        ledger.record(
            ResourceKind::SecurityGroup,
            ResourceRef::new(group.id, group.name),
        );

        for rule in &ingress_rules() {
            self.backend
                .add_security_group_rule(&group_id, rule)
                .await
                .map_err(cloud("add_security_group_rule"))?;
            info!(
                group = %name,
                protocol = rule.protocol.as_str(),
                from_port = rule.from_port,
                to_port = rule.to_port,
                "ingress rule added"
            );
        }
        Ok(())
    }

    async fn create_flavor(
        &self,
        ctx: &RunContext,
        ledger: &mut CreatedResources,
        kind: ResourceKind,
    ) -> Result<String, ProvisionError<B::Error>> {
        let (prefix, ram_mb, vcpus) = if kind == ResourceKind::AgentFlavor {
            (AGENT_FLAVOR_PREFIX, AGENT_RAM_MB, AGENT_VCPUS)
        } else {
            (RUNNER_FLAVOR_PREFIX, RUNNER_RAM_MB, RUNNER_VCPUS)
        };
        let spec = FlavorSpec {
            name: ctx.run_id().scoped(prefix),
            ram_mb,
            vcpus,
            disk_gb: DISK_GB,
        };
        let flavor = self
            .backend
            .create_flavor(&spec)
            .await
            .map_err(cloud("create_flavor"))?;
        let id = flavor.id.clone();
        ledger.record(kind, ResourceRef::new(flavor.id, flavor.name));
        Ok(id)
    }

    async fn create_image(
        &self,
        ctx: &RunContext,
        ledger: &mut CreatedResources,
        kind: ResourceKind,
        source: &Utf8Path,
    ) -> Result<String, ProvisionError<B::Error>> {
        ensure_readable(source)?;
        let prefix = if kind == ResourceKind::AgentImage {
            AGENT_IMAGE_PREFIX
        } else {
            RUNNER_PREFIX
        };
        let spec = ImageSpec {
            name: ctx.run_id().scoped(prefix),
            disk_format: String::from("qcow2"),
            container_format: String::from("bare"),
        };
        let image = self
            .backend
            .create_image(&spec)
            .await
            .map_err(cloud("create_image"))?;
        let id = image.id.clone();
        ledger.record(kind, ResourceRef::new(image.id, image.name));

        info!(image_id = %id, source = %source, "uploading image data");
        self.backend
            .upload_image(&id, source)
            .await
            .map_err(cloud("upload_image"))?;
        info!(image_id = %id, "image data uploaded");
        Ok(id)
    }

    async fn boot_instance(
        &self,
        ctx: &RunContext,
        ledger: &mut CreatedResources,
        image_id: &str,
        flavor_id: &str,
    ) -> Result<Server, ProvisionError<B::Error>> {
        let request = ServerRequest {
            name: ctx.run_id().scoped(RUNNER_PREFIX),
            image_id: image_id.to_owned(),
            flavor_id: flavor_id.to_owned(),
            key_name: ctx.run_id().scoped(KEYPAIR_PREFIX),
            security_group: ctx.run_id().scoped(SECURITY_GROUP_PREFIX),
            network_id: ctx.network().id.clone(),
        };
        let server = self
            .backend
            .boot_server(&request)
            .await
            .map_err(cloud("boot_server"))?;
        ledger.record(
            ResourceKind::Instance,
            ResourceRef::new(server.id.clone(), server.name.clone()),
        );

        let backend = self.backend;
        let server_id = server.id.clone();
        let id = server_id.as_str();
        let ready = self
            .poller
            .wait_until_terminal("instance", SERVER_BOOT, server, self.cancel, move || {
                backend.get_server(id)
            })
            .await?;
        Ok(ready.resource)
    }

    async fn assign_address(&self, server: &Server) -> Result<String, ProvisionError<B::Error>> {
        let floating_ips = self
            .backend
            .list_floating_ips()
            .await
            .map_err(cloud("list_floating_ips"))?;
        let candidate = select_floating_ip(&floating_ips, self.floating_ip_pool).ok_or_else(
            || ProvisionError::ResourceExhausted {
                pool: self.floating_ip_pool.map(str::to_owned),
            },
        )?;
        let address = candidate.ip.clone();

        self.backend
            .associate_floating_ip(&server.id, &address)
            .await
            .map_err(cloud("associate_floating_ip"))?;
        info!(instance = %server.name, address = %address, "floating IP bound");
        Ok(address)
    }
}

/// Picks the first unbound floating IP, optionally restricted to a pool.
#[must_use]
pub fn select_floating_ip<'a>(
    floating_ips: &'a [FloatingIp],
    pool: Option<&str>,
) -> Option<&'a FloatingIp> {
    floating_ips.iter().find(|floating_ip| {
        floating_ip.is_free()
            && pool.is_none_or(|wanted| floating_ip.pool.as_deref() == Some(wanted))
    })
}
