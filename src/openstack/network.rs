//! Network (Neutron v2.0) lookups.

use reqwest::Method;
use serde::Deserialize;

use crate::backend::{Network, Subnet};

use super::http::{authed, flexible_id, join, send_json};
use super::{OpenStackBackend, OpenStackError};

#[derive(Deserialize)]
pub(super) struct NetworkRecord {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    subnets: Vec<String>,
}

impl From<NetworkRecord> for Network {
    fn from(value: NetworkRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            subnets: value.subnets,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct NetworkResponse {
    pub(super) network: NetworkRecord,
}

#[derive(Deserialize)]
pub(super) struct NetworkList {
    pub(super) networks: Vec<NetworkRecord>,
}

#[derive(Deserialize)]
pub(super) struct SubnetResponse {
    subnet: SubnetRecord,
}

#[derive(Deserialize)]
struct SubnetRecord {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    cidr: String,
}

impl From<SubnetResponse> for Subnet {
    fn from(value: SubnetResponse) -> Self {
        Self {
            id: value.subnet.id,
            cidr: value.subnet.cidr,
        }
    }
}

impl OpenStackBackend {
    async fn network_url(&self, path: &str) -> Result<(String, String), OpenStackError> {
        let identity = self.session().await?;
        Ok((
            join(&identity.endpoints.network, path),
            identity.token.clone(),
        ))
    }

    pub(super) async fn neutron_show_network(&self, id: &str) -> Result<Network, OpenStackError> {
        let (url, token) = self.network_url(&format!("networks/{id}")).await?;
        let response: NetworkResponse =
            send_json("show_network", authed(Method::GET, &url, &token)).await?;
        Ok(response.network.into())
    }

    pub(super) async fn neutron_find_networks(
        &self,
        name: &str,
    ) -> Result<Vec<Network>, OpenStackError> {
        let (url, token) = self.network_url("networks").await?;
        let response: NetworkList = send_json(
            "find_networks",
            authed(Method::GET, &url, &token).query(&[("name", name)]),
        )
        .await?;
        Ok(response.networks.into_iter().map(Network::from).collect())
    }

    pub(super) async fn neutron_show_subnet(&self, id: &str) -> Result<Subnet, OpenStackError> {
        let (url, token) = self.network_url(&format!("subnets/{id}")).await?;
        let response: SubnetResponse =
            send_json("show_subnet", authed(Method::GET, &url, &token)).await?;
        Ok(response.into())
    }
}
