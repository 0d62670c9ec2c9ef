//! Backend abstraction over the cloud control plane.
//!
//! The provisioner, poller, and teardown coordinator only talk to the cloud
//! through [`Backend`], so tests can drive the whole lifecycle with a fake.
//! Each method is one control-plane call; sequencing and failure policy live
//! with the callers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;

/// Authenticated session returned by the identity service.
#[derive(Clone, Eq, PartialEq)]
pub struct Identity {
    /// Token sent as `X-Auth-Token` on every call.
    pub token: String,
    /// Endpoints resolved from the service catalog for the configured region.
    pub endpoints: ServiceEndpoints,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Versioned base URLs for the services the run uses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceEndpoints {
    /// Compute (Nova) endpoint, including the tenant path segment.
    pub compute: String,
    /// Image (Glance) v2 endpoint.
    pub image: String,
    /// Network (Neutron) v2.0 endpoint.
    pub network: String,
}

/// Network record as reported by the network service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Network {
    /// Network identifier.
    pub id: String,
    /// Human readable network name.
    pub name: String,
    /// Identifiers of the network's subnets, in service order.
    pub subnets: Vec<String>,
}

/// Subnet record as reported by the network service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subnet {
    /// Subnet identifier.
    pub id: String,
    /// Address range in CIDR notation.
    pub cidr: String,
}

/// Private key material returned once when a keypair is generated.
///
/// The value never appears in `Debug` output.
#[derive(Clone, Eq, PartialEq)]
pub struct PrivateKey(String);

impl PrivateKey {
    /// Wraps PEM encoded key material.
    #[must_use]
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Returns the PEM encoded key material.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Keypair generated by the compute service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Keypair {
    /// Keypair name; the compute service also uses it as the identifier.
    pub name: String,
    /// Generated private key.
    pub private_key: PrivateKey,
}

/// Security group record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroup {
    /// Group identifier.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// IP protocol matched by an ingress rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Internet Control Message Protocol.
    Icmp,
}

impl Protocol {
    /// Returns the wire name used by the compute API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

/// Ingress rule added to a security group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    /// Protocol matched by the rule.
    pub protocol: Protocol,
    /// First port (or ICMP type; `-1` matches all).
    pub from_port: i32,
    /// Last port (or ICMP code; `-1` matches all).
    pub to_port: i32,
    /// Source address range.
    pub cidr: String,
}

/// Compute sizing profile to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlavorSpec {
    /// Flavor name.
    pub name: String,
    /// Memory in MiB.
    pub ram_mb: u32,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Root disk in GiB.
    pub disk_gb: u32,
}

/// Sizing profile record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Flavor {
    /// Flavor identifier.
    pub id: String,
    /// Flavor name.
    pub name: String,
}

/// Image record to declare before its data is uploaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSpec {
    /// Image name.
    pub name: String,
    /// Disk format, for example `qcow2`.
    pub disk_format: String,
    /// Container format, for example `bare`.
    pub container_format: String,
}

/// Image record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Image identifier.
    pub id: String,
    /// Image name.
    pub name: String,
}

/// Parameters for booting a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Server name.
    pub name: String,
    /// Boot image identifier.
    pub image_id: String,
    /// Flavor identifier.
    pub flavor_id: String,
    /// Keypair injected into the instance.
    pub key_name: String,
    /// Security group applied to the instance (by name).
    pub security_group: String,
    /// Network the instance attaches to.
    pub network_id: String,
}

/// Server record with its current lifecycle status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Status reported by the compute service (`BUILD`, `ACTIVE`, `ERROR`, ...).
    pub status: String,
}

/// Floating IP record from the shared pool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Floating IP identifier.
    pub id: String,
    /// Routable address.
    pub ip: String,
    /// Private address the floating IP currently maps to, if any.
    pub fixed_ip: Option<String>,
    /// Instance the floating IP is bound to, if any.
    pub instance_id: Option<String>,
    /// Pool the address belongs to.
    pub pool: Option<String>,
}

impl FloatingIp {
    /// Returns `true` when the address is neither bound nor mapped.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.instance_id.is_none() && self.fixed_ip.is_none()
    }
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Control-plane operations needed by a load-test run.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the authenticated identity, authenticating on first use.
    fn identity(&self) -> BackendFuture<'_, Identity, Self::Error>;

    /// Looks a network up by identifier.
    fn show_network<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Network, Self::Error>;

    /// Lists networks carrying the given name.
    fn find_networks<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Vec<Network>, Self::Error>;

    /// Looks a subnet up by identifier.
    fn show_subnet<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Subnet, Self::Error>;

    /// Generates a keypair and returns its private key.
    fn create_keypair<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Keypair, Self::Error>;

    /// Deletes a keypair by name.
    fn delete_keypair<'a>(&'a self, name: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Creates an empty security group.
    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, SecurityGroup, Self::Error>;

    /// Adds an ingress rule to a security group.
    fn add_security_group_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a IngressRule,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Deletes a security group.
    fn delete_security_group<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Creates a sizing profile.
    fn create_flavor<'a>(&'a self, spec: &'a FlavorSpec) -> BackendFuture<'a, Flavor, Self::Error>;

    /// Deletes a sizing profile.
    fn delete_flavor<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Declares an image record without data.
    fn create_image<'a>(&'a self, spec: &'a ImageSpec) -> BackendFuture<'a, Image, Self::Error>;

    /// Streams a local file into a declared image.
    fn upload_image<'a>(
        &'a self,
        id: &'a str,
        source: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Deletes an image.
    fn delete_image<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Requests a new server; the returned record reflects the initial status.
    fn boot_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, Server, Self::Error>;

    /// Fetches the current server record.
    fn get_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Server, Self::Error>;

    /// Deletes a server.
    fn delete_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Lists floating IPs visible to the tenant.
    fn list_floating_ips(&self) -> BackendFuture<'_, Vec<FloatingIp>, Self::Error>;

    /// Binds a floating IP address to a server.
    fn associate_floating_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> BackendFuture<'a, (), Self::Error>;
}
