//! Keystone v2.0 authentication and service catalog resolution.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{Identity, ServiceEndpoints};
use crate::config::OpenStackConfig;

use super::OpenStackError;
use super::http::{API_TIMEOUT, HTTP_CLIENT, join, send_json, versioned};

const IMAGE_API_VERSION: &str = "v2";
const NETWORK_API_VERSION: &str = "v2.0";

#[derive(Serialize)]
pub(super) struct TokenRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    #[serde(rename = "tenantName")]
    tenant_name: &'a str,
    #[serde(rename = "passwordCredentials")]
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub(super) fn new(config: &'a OpenStackConfig) -> Self {
        Self {
            auth: Auth {
                tenant_name: &config.tenant_name,
                password_credentials: PasswordCredentials {
                    username: &config.username,
                    password: &config.password,
                },
            },
        }
    }
}

#[derive(Deserialize)]
pub(super) struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
pub(super) struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

/// Returns the public URL of `service` in `region`.
pub(super) fn endpoint_from_catalog(
    catalog: &[CatalogEntry],
    service: &'static str,
    region: &str,
) -> Result<String, OpenStackError> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service)
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| endpoint.region.as_deref().is_none_or(|name| name == region))
        .map(|endpoint| endpoint.public_url.clone())
        .ok_or_else(|| OpenStackError::MissingEndpoint {
            service,
            region: region.to_owned(),
        })
}

/// Converts a token response into the session used by the run.
pub(super) fn identity_from_response(
    response: TokenResponse,
    region: &str,
) -> Result<Identity, OpenStackError> {
    let catalog = &response.access.service_catalog;
    let compute = endpoint_from_catalog(catalog, "compute", region)?;
    let image = endpoint_from_catalog(catalog, "image", region)?;
    let network = endpoint_from_catalog(catalog, "network", region)?;
    Ok(Identity {
        token: response.access.token.id,
        endpoints: ServiceEndpoints {
            compute: compute.trim_end_matches('/').to_owned(),
            image: versioned(&image, IMAGE_API_VERSION),
            network: versioned(&network, NETWORK_API_VERSION),
        },
    })
}

/// Requests a token and resolves the service endpoints.
pub(super) async fn authenticate(config: &OpenStackConfig) -> Result<Identity, OpenStackError> {
    let auth_url = config.resolved_auth_url()?;
    let url = join(&auth_url, "tokens");
    let request = HTTP_CLIENT
        .post(&url)
        .timeout(API_TIMEOUT)
        .json(&TokenRequest::new(config));
    let response: TokenResponse = send_json("authenticate", request).await?;
    let identity = identity_from_response(response, &config.region)?;
    info!(
        tenant = %config.tenant_name,
        region = %config.region,
        compute = %identity.endpoints.compute,
        image = %identity.endpoints.image,
        network = %identity.endpoints.network,
        "authenticated"
    );
    Ok(identity)
}
