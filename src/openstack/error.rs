//! Error types for the OpenStack backend.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the OpenStack backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OpenStackError {
    /// Raised when the identity configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the service catalog lacks a required service.
    #[error("no {service} endpoint for region {region} in the service catalog")]
    MissingEndpoint {
        /// Catalog service type.
        service: &'static str,
        /// Region the lookup was restricted to.
        region: String,
    },
    /// Raised when a request never produced a response.
    #[error("{action}: request failed: {message}")]
    Transport {
        /// Operation being performed.
        action: &'static str,
        /// Transport error text.
        message: String,
    },
    /// Raised when the service answered with a non-success status.
    #[error("{action}: HTTP {status}: {message}")]
    Api {
        /// Operation being performed.
        action: &'static str,
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },
    /// Raised when a success response cannot be decoded.
    #[error("{action}: unexpected response body: {message}")]
    Decode {
        /// Operation being performed.
        action: &'static str,
        /// Decoder error text.
        message: String,
    },
    /// Raised when a local image file cannot be opened for upload.
    #[error("failed to open image file `{path}`: {message}")]
    ImageFile {
        /// Local path.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
}

impl From<ConfigError> for OpenStackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
