//! OpenStack backend implementation of the run lifecycle.
//!
//! Talks JSON over HTTP to Keystone v2.0, Nova, Glance v2, and Neutron v2.0.
//! The token and service endpoints are fetched on first use and cached for
//! the lifetime of the backend.

mod compute;
mod error;
mod http;
mod identity;
mod image;
mod network;

use camino::Utf8Path;
use tokio::sync::OnceCell;

use crate::backend::{
    Backend, BackendFuture, Flavor, FlavorSpec, FloatingIp, Identity, Image, ImageSpec,
    IngressRule, Keypair, Network, SecurityGroup, Server, ServerRequest, Subnet,
};
use crate::config::OpenStackConfig;

pub use error::OpenStackError;

/// Backend that provisions resources through the OpenStack service APIs.
#[derive(Debug)]
pub struct OpenStackBackend {
    config: OpenStackConfig,
    identity: OnceCell<Identity>,
}

impl OpenStackBackend {
    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OpenStackError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: OpenStackConfig) -> Result<Self, OpenStackError> {
        config.validate()?;
        Ok(Self {
            config,
            identity: OnceCell::new(),
        })
    }

    /// Returns the cached identity, authenticating on first use.
    async fn session(&self) -> Result<&Identity, OpenStackError> {
        self.identity
            .get_or_try_init(|| identity::authenticate(&self.config))
            .await
    }
}

impl Backend for OpenStackBackend {
    type Error = OpenStackError;

    fn identity(&self) -> BackendFuture<'_, Identity, Self::Error> {
        Box::pin(async move { self.session().await.cloned() })
    }

    fn show_network<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Network, Self::Error> {
        Box::pin(self.neutron_show_network(id))
    }

    fn find_networks<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Vec<Network>, Self::Error> {
        Box::pin(self.neutron_find_networks(name))
    }

    fn show_subnet<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Subnet, Self::Error> {
        Box::pin(self.neutron_show_subnet(id))
    }

    fn create_keypair<'a>(&'a self, name: &'a str) -> BackendFuture<'a, Keypair, Self::Error> {
        Box::pin(self.nova_create_keypair(name))
    }

    fn delete_keypair<'a>(&'a self, name: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_delete_keypair(name))
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, SecurityGroup, Self::Error> {
        Box::pin(self.nova_create_security_group(name))
    }

    fn add_security_group_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a IngressRule,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_add_security_group_rule(group_id, rule))
    }

    fn delete_security_group<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_delete_security_group(id))
    }

    fn create_flavor<'a>(&'a self, spec: &'a FlavorSpec) -> BackendFuture<'a, Flavor, Self::Error> {
        Box::pin(self.nova_create_flavor(spec))
    }

    fn delete_flavor<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_delete_flavor(id))
    }

    fn create_image<'a>(&'a self, spec: &'a ImageSpec) -> BackendFuture<'a, Image, Self::Error> {
        Box::pin(self.glance_create_image(spec))
    }

    fn upload_image<'a>(
        &'a self,
        id: &'a str,
        source: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.glance_upload_image(id, source))
    }

    fn delete_image<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.glance_delete_image(id))
    }

    fn boot_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, Server, Self::Error> {
        Box::pin(self.nova_boot_server(request))
    }

    fn get_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, Server, Self::Error> {
        Box::pin(self.nova_get_server(id))
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_delete_server(id))
    }

    fn list_floating_ips(&self) -> BackendFuture<'_, Vec<FloatingIp>, Self::Error> {
        Box::pin(self.nova_list_floating_ips())
    }

    fn associate_floating_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.nova_associate_floating_ip(server_id, address))
    }
}

#[cfg(test)]
mod tests;
