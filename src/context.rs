//! Run identity and the immutable per-run context.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::backend::Identity;

/// Errors raised when building a [`RunId`] from caller input.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunIdError {
    /// Raised when the token is empty or contains characters unsafe for
    /// resource and file names.
    #[error("run id must be non-empty ASCII letters, digits, or '-': {0:?}")]
    Invalid(String),
}

/// Per-invocation token appended to every created resource and log file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh random token (32 lowercase hex digits).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps a caller supplied token, for deterministic or resumed runs.
    ///
    /// # Errors
    ///
    /// Returns [`RunIdError::Invalid`] when the token is blank or contains
    /// anything other than ASCII alphanumerics and `-`.
    pub fn new(value: impl Into<String>) -> Result<Self, RunIdError> {
        let token = value.into().trim().to_owned();
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if valid {
            Ok(Self(token))
        } else {
            Err(RunIdError::Invalid(token))
        }
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds `<prefix>-<token>`, the naming scheme shared by every resource.
    #[must_use]
    pub fn scoped(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Management network the instance attaches to, fully resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagementNetwork {
    /// Network identifier.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Address range, either configured or taken from the first subnet.
    pub cidr: String,
}

/// Everything a run needs to know about itself once the network is resolved.
///
/// Built exactly once per run and passed by reference afterwards.
#[derive(Clone, Debug)]
pub struct RunContext {
    run_id: RunId,
    identity: Identity,
    network: ManagementNetwork,
}

impl RunContext {
    /// Assembles the context.
    #[must_use]
    pub const fn new(run_id: RunId, identity: Identity, network: ManagementNetwork) -> Self {
        Self {
            run_id,
            identity,
            network,
        }
    }

    /// Returns the run token.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the authenticated identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the resolved management network.
    #[must_use]
    pub const fn network(&self) -> &ManagementNetwork {
        &self.network
    }
}
