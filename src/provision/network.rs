//! Management network selection and resolution.

use crate::config::{ConfigError, RunnerConfig};

/// How the management network is located, decided before any cloud call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkSelector {
    /// Look the network up by identifier.
    ById {
        /// Network identifier.
        id: String,
        /// CIDR override.
        cidr: Option<String>,
    },
    /// Take the first network carrying this name.
    ByName {
        /// Network name.
        name: String,
        /// CIDR override.
        cidr: Option<String>,
    },
}

impl NetworkSelector {
    /// Builds the selector from configuration; an identifier wins over a name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when neither is configured.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, ConfigError> {
        let cidr = config.network_cidr().map(str::to_owned);
        if let Some(id) = config.network_id() {
            return Ok(Self::ById {
                id: id.to_owned(),
                cidr,
            });
        }
        config
            .network_name()
            .map(|name| Self::ByName {
                name: name.to_owned(),
                cidr,
            })
            .ok_or_else(|| {
                ConfigError::MissingField(String::from(
                    "missing management network: set LR_MANAGEMENT_NET_ID or \
                     LR_MANAGEMENT_NET_NAME, or add management_net_id or \
                     management_net_name to lr-runner.toml",
                ))
            })
    }

    /// Returns the configured CIDR override.
    #[must_use]
    pub fn cidr_override(&self) -> Option<&str> {
        match self {
            Self::ById { cidr, .. } | Self::ByName { cidr, .. } => cidr.as_deref(),
        }
    }
}
