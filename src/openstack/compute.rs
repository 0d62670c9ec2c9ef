//! Compute (Nova) calls: keypairs, security groups, flavors, servers, and
//! floating IPs.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::backend::{
    Flavor, FlavorSpec, FloatingIp, IngressRule, Keypair, PrivateKey, SecurityGroup, Server,
    ServerRequest,
};

use super::http::{authed, flexible_id, flexible_id_opt, join, send, send_json};
use super::{OpenStackBackend, OpenStackError};

#[derive(Serialize)]
pub(super) struct KeypairEnvelope<'a> {
    keypair: NewKeypair<'a>,
}

#[derive(Serialize)]
struct NewKeypair<'a> {
    name: &'a str,
}

impl<'a> KeypairEnvelope<'a> {
    pub(super) const fn new(name: &'a str) -> Self {
        Self {
            keypair: NewKeypair { name },
        }
    }
}

#[derive(Deserialize)]
pub(super) struct KeypairResponse {
    keypair: CreatedKeypair,
}

impl KeypairResponse {
    /// Keypairs are addressed by name in the v2 API.
    pub(super) fn into_keypair(self) -> Keypair {
        let keypair = self.keypair;
        Keypair {
            name: keypair.name,
            private_key: PrivateKey::new(keypair.private_key),
        }
    }
}

#[derive(Deserialize)]
struct CreatedKeypair {
    name: String,
    private_key: String,
}

#[derive(Serialize)]
pub(super) struct SecurityGroupEnvelope<'a> {
    security_group: NewSecurityGroup<'a>,
}

#[derive(Serialize)]
struct NewSecurityGroup<'a> {
    name: &'a str,
    description: &'a str,
}

impl<'a> SecurityGroupEnvelope<'a> {
    pub(super) const fn new(name: &'a str) -> Self {
        Self {
            security_group: NewSecurityGroup {
                name,
                description: "",
            },
        }
    }
}

#[derive(Deserialize)]
pub(super) struct SecurityGroupResponse {
    security_group: CreatedSecurityGroup,
}

impl SecurityGroupResponse {
    pub(super) fn into_security_group(self) -> SecurityGroup {
        SecurityGroup {
            id: self.security_group.id,
            name: self.security_group.name,
        }
    }
}

#[derive(Deserialize)]
struct CreatedSecurityGroup {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    name: String,
}

#[derive(Serialize)]
pub(super) struct RuleEnvelope<'a> {
    security_group_rule: NewRule<'a>,
}

#[derive(Serialize)]
struct NewRule<'a> {
    parent_group_id: &'a str,
    ip_protocol: &'static str,
    from_port: i32,
    to_port: i32,
    cidr: &'a str,
}

impl<'a> RuleEnvelope<'a> {
    pub(super) fn new(group_id: &'a str, rule: &'a IngressRule) -> Self {
        Self {
            security_group_rule: NewRule {
                parent_group_id: group_id,
                ip_protocol: rule.protocol.as_str(),
                from_port: rule.from_port,
                to_port: rule.to_port,
                cidr: &rule.cidr,
            },
        }
    }
}

#[derive(Serialize)]
pub(super) struct FlavorEnvelope<'a> {
    flavor: NewFlavor<'a>,
}

#[derive(Serialize)]
struct NewFlavor<'a> {
    name: &'a str,
    ram: u32,
    vcpus: u32,
    disk: u32,
}

impl<'a> FlavorEnvelope<'a> {
    pub(super) fn new(spec: &'a FlavorSpec) -> Self {
        Self {
            flavor: NewFlavor {
                name: &spec.name,
                ram: spec.ram_mb,
                vcpus: spec.vcpus,
                disk: spec.disk_gb,
            },
        }
    }
}

#[derive(Deserialize)]
pub(super) struct FlavorResponse {
    flavor: CreatedFlavor,
}

impl FlavorResponse {
    pub(super) fn into_flavor(self) -> Flavor {
        Flavor {
            id: self.flavor.id,
            name: self.flavor.name,
        }
    }
}

#[derive(Deserialize)]
struct CreatedFlavor {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    name: String,
}

#[derive(Serialize)]
pub(super) struct ServerEnvelope<'a> {
    server: NewServer<'a>,
}

#[derive(Serialize)]
struct NewServer<'a> {
    name: &'a str,
    #[serde(rename = "imageRef")]
    image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    key_name: &'a str,
    security_groups: [NamedGroup<'a>; 1],
    networks: [NetworkAttachment<'a>; 1],
}

#[derive(Serialize)]
struct NamedGroup<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct NetworkAttachment<'a> {
    uuid: &'a str,
}

impl<'a> ServerEnvelope<'a> {
    pub(super) fn new(request: &'a ServerRequest) -> Self {
        Self {
            server: NewServer {
                name: &request.name,
                image_ref: &request.image_id,
                flavor_ref: &request.flavor_id,
                key_name: &request.key_name,
                security_groups: [NamedGroup {
                    name: &request.security_group,
                }],
                networks: [NetworkAttachment {
                    uuid: &request.network_id,
                }],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerResponse {
    server: ServerRecord,
}

#[derive(Debug, Deserialize)]
struct ServerRecord {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Status assumed for a freshly accepted boot request that omits it.
const INITIAL_SERVER_STATUS: &str = "BUILD";

impl ServerResponse {
    pub(super) fn into_server(self, fallback_name: &str) -> Server {
        Server {
            id: self.server.id,
            name: self
                .server
                .name
                .unwrap_or_else(|| fallback_name.to_owned()),
            status: self
                .server
                .status
                .unwrap_or_else(|| String::from(INITIAL_SERVER_STATUS)),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct FloatingIpList {
    floating_ips: Vec<FloatingIpRecord>,
}

#[derive(Deserialize)]
struct FloatingIpRecord {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    ip: String,
    #[serde(default)]
    fixed_ip: Option<String>,
    #[serde(default, deserialize_with = "flexible_id_opt")]
    instance_id: Option<String>,
    #[serde(default)]
    pool: Option<String>,
}

impl FloatingIpList {
    pub(super) fn into_floating_ips(self) -> Vec<FloatingIp> {
        self.floating_ips
            .into_iter()
            .map(|record| FloatingIp {
                id: record.id,
                ip: record.ip,
                fixed_ip: record.fixed_ip,
                instance_id: record.instance_id,
                pool: record.pool,
            })
            .collect()
    }
}

#[derive(Serialize)]
pub(super) struct AddFloatingIpAction<'a> {
    #[serde(rename = "addFloatingIp")]
    add_floating_ip: FloatingAddress<'a>,
}

#[derive(Serialize)]
struct FloatingAddress<'a> {
    address: &'a str,
}

impl<'a> AddFloatingIpAction<'a> {
    pub(super) const fn new(address: &'a str) -> Self {
        Self {
            add_floating_ip: FloatingAddress { address },
        }
    }
}

impl OpenStackBackend {
    async fn compute_url(&self, path: &str) -> Result<(String, String), OpenStackError> {
        let identity = self.session().await?;
        Ok((
            join(&identity.endpoints.compute, path),
            identity.token.clone(),
        ))
    }

    pub(super) async fn nova_create_keypair(&self, name: &str) -> Result<Keypair, OpenStackError> {
        let (url, token) = self.compute_url("os-keypairs").await?;
        let response: KeypairResponse = send_json(
            "create_keypair",
            authed(Method::POST, &url, &token).json(&KeypairEnvelope::new(name)),
        )
        .await?;
        Ok(response.into_keypair())
    }

    pub(super) async fn nova_delete_keypair(&self, name: &str) -> Result<(), OpenStackError> {
        let (url, token) = self.compute_url(&format!("os-keypairs/{name}")).await?;
        send("delete_keypair", authed(Method::DELETE, &url, &token)).await?;
        Ok(())
    }

    pub(super) async fn nova_create_security_group(
        &self,
        name: &str,
    ) -> Result<SecurityGroup, OpenStackError> {
        let (url, token) = self.compute_url("os-security-groups").await?;
        let response: SecurityGroupResponse = send_json(
            "create_security_group",
            authed(Method::POST, &url, &token).json(&SecurityGroupEnvelope::new(name)),
        )
        .await?;
        Ok(response.into_security_group())
    }

    pub(super) async fn nova_add_security_group_rule(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> Result<(), OpenStackError> {
        let (url, token) = self.compute_url("os-security-group-rules").await?;
        send(
            "add_security_group_rule",
            authed(Method::POST, &url, &token).json(&RuleEnvelope::new(group_id, rule)),
        )
        .await?;
        Ok(())
    }

    pub(super) async fn nova_delete_security_group(&self, id: &str) -> Result<(), OpenStackError> {
        let (url, token) = self
            .compute_url(&format!("os-security-groups/{id}"))
            .await?;
        send("delete_security_group", authed(Method::DELETE, &url, &token)).await?;
        Ok(())
    }

    pub(super) async fn nova_create_flavor(
        &self,
        spec: &FlavorSpec,
    ) -> Result<Flavor, OpenStackError> {
        let (url, token) = self.compute_url("flavors").await?;
        let response: FlavorResponse = send_json(
            "create_flavor",
            authed(Method::POST, &url, &token).json(&FlavorEnvelope::new(spec)),
        )
        .await?;
        Ok(response.into_flavor())
    }

    pub(super) async fn nova_delete_flavor(&self, id: &str) -> Result<(), OpenStackError> {
        let (url, token) = self.compute_url(&format!("flavors/{id}")).await?;
        send("delete_flavor", authed(Method::DELETE, &url, &token)).await?;
        Ok(())
    }

    pub(super) async fn nova_boot_server(
        &self,
        request: &ServerRequest,
    ) -> Result<Server, OpenStackError> {
        let (url, token) = self.compute_url("servers").await?;
        let response: ServerResponse = send_json(
            "boot_server",
            authed(Method::POST, &url, &token).json(&ServerEnvelope::new(request)),
        )
        .await?;
        Ok(response.into_server(&request.name))
    }

    pub(super) async fn nova_get_server(&self, id: &str) -> Result<Server, OpenStackError> {
        let (url, token) = self.compute_url(&format!("servers/{id}")).await?;
        let response: ServerResponse =
            send_json("get_server", authed(Method::GET, &url, &token)).await?;
        Ok(response.into_server(id))
    }

    pub(super) async fn nova_delete_server(&self, id: &str) -> Result<(), OpenStackError> {
        let (url, token) = self.compute_url(&format!("servers/{id}")).await?;
        send("delete_server", authed(Method::DELETE, &url, &token)).await?;
        Ok(())
    }

    pub(super) async fn nova_list_floating_ips(&self) -> Result<Vec<FloatingIp>, OpenStackError> {
        let (url, token) = self.compute_url("os-floating-ips").await?;
        let response: FloatingIpList =
            send_json("list_floating_ips", authed(Method::GET, &url, &token)).await?;
        Ok(response.into_floating_ips())
    }

    pub(super) async fn nova_associate_floating_ip(
        &self,
        server_id: &str,
        address: &str,
    ) -> Result<(), OpenStackError> {
        let (url, token) = self
            .compute_url(&format!("servers/{server_id}/action"))
            .await?;
        send(
            "associate_floating_ip",
            authed(Method::POST, &url, &token).json(&AddFloatingIpAction::new(address)),
        )
        .await?;
        Ok(())
    }
}
