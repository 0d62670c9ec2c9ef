//! Configuration loading via `ortho-config`.
//!
//! Two layers are loaded independently: [`OpenStackConfig`] carries the
//! identity credentials under the conventional `OS_` prefix, and
//! [`RunnerConfig`] carries everything specific to a load-test run under the
//! `LR_` prefix. Both merge defaults, the shared `lr-runner.toml`, and
//! environment variables.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default port of the Keystone v2.0 public endpoint.
const KEYSTONE_PORT: u16 = 5000;

/// Identity and endpoint settings for the OpenStack control plane.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OS",
    discovery(
        app_name = "lr-runner",
        env_var = "LR_RUNNER_CONFIG_PATH",
        config_file_name = "lr-runner.toml",
        dotfile_name = ".lr-runner.toml",
        project_file_name = "lr-runner.toml"
    )
)]
pub struct OpenStackConfig {
    /// Address of the controller node. Used to derive the identity endpoint
    /// when no explicit `auth_url` is configured.
    pub controller_ip: Option<String>,
    /// Tenant (project) the run is billed to.
    #[ortho_config(default = "demo".to_owned())]
    pub tenant_name: String,
    /// Identity user name.
    #[ortho_config(default = "admin".to_owned())]
    pub username: String,
    /// Identity password.
    #[ortho_config(default = "pass".to_owned())]
    pub password: String,
    /// Keystone v2.0 endpoint. Defaults to `http://<controller_ip>:5000/v2.0/`.
    pub auth_url: Option<String>,
    /// Region used to select endpoints from the service catalog.
    #[ortho_config(default = "RegionOne".to_owned())]
    pub region: String,
}

impl std::fmt::Debug for OpenStackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackConfig")
            .field("controller_ip", &self.controller_ip)
            .field("tenant_name", &self.tenant_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("region", &self.region)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to lr-runner.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(metadata.missing());
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

impl OpenStackConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("lr-runner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the identity endpoint, deriving it from the controller address
    /// when no explicit URL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when neither `auth_url` nor
    /// `controller_ip` is set.
    pub fn resolved_auth_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = non_blank(self.auth_url.as_deref()) {
            return Ok(url.to_owned());
        }
        non_blank(self.controller_ip.as_deref())
            .map(|controller| format!("http://{controller}:{KEYSTONE_PORT}/v2.0/"))
            .ok_or_else(|| {
                FieldMetadata::new(
                    "identity endpoint (or controller address)",
                    "OS_AUTH_URL or OS_CONTROLLER_IP",
                    "auth_url",
                )
                .missing()
            })
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.tenant_name,
            &FieldMetadata::new("tenant name", "OS_TENANT_NAME", "tenant_name"),
        )?;
        require_field(
            &self.username,
            &FieldMetadata::new("identity user name", "OS_USERNAME", "username"),
        )?;
        require_field(
            &self.password,
            &FieldMetadata::new("identity password", "OS_PASSWORD", "password"),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("identity region", "OS_REGION", "region"),
        )?;
        self.resolved_auth_url().map(|_| ())
    }
}

/// Per-run settings: network selection, test parameters, and local artifacts.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LR",
    discovery(
        app_name = "lr-runner",
        env_var = "LR_RUNNER_CONFIG_PATH",
        config_file_name = "lr-runner.toml",
        dotfile_name = ".lr-runner.toml",
        project_file_name = "lr-runner.toml"
    )
)]
pub struct RunnerConfig {
    /// Name of the management network the instance attaches to.
    pub management_net_name: Option<String>,
    /// CIDR override for the management network. When unset the CIDR is
    /// derived from the network's first subnet.
    pub management_net_cidr: Option<String>,
    /// Explicit management network identifier; takes precedence over the name.
    pub management_net_id: Option<String>,
    /// Name of the load test to run on the instance.
    #[ortho_config(default = "lr-test".to_owned())]
    pub test_name: String,
    /// Name of the network the agents create for the test.
    #[ortho_config(default = "lr-test-net".to_owned())]
    pub test_net_name: String,
    /// Arguments handed to the load generator, rendered into the templates.
    #[ortho_config(default = "['-t', '15']".to_owned())]
    pub iperf_args: String,
    /// Local disk image for the runner instance.
    #[ortho_config(default = "data/load_runner.qcow2".to_owned())]
    pub runner_image_path: String,
    /// Local disk image for the test agents.
    #[ortho_config(default = "data/centos-nettest.qcow2".to_owned())]
    pub agent_image_path: String,
    /// Cloud image URL exposed to the templates as `UBUNTU_IMAGE_URL`.
    #[ortho_config(
        default = "http://cloud-images.ubuntu.com/trusty/current/trusty-server-cloudimg-amd64-disk1.img".to_owned()
    )]
    pub ubuntu_image_url: String,
    /// Template for the runner's settings module.
    #[ortho_config(default = "data/settings.py.template".to_owned())]
    pub settings_template: String,
    /// Template for the test definition.
    #[ortho_config(default = "data/test.yml.template".to_owned())]
    pub test_template: String,
    /// Directory receiving generated files and run logs.
    #[ortho_config(default = ".".to_owned())]
    pub artifact_dir: String,
    /// Restricts floating IP allocation to a single pool when set.
    pub floating_ip_pool: Option<String>,
    /// Upper bound on the wait for the instance to leave `BUILD`.
    #[ortho_config(default = 600)]
    pub boot_timeout_secs: u64,
    /// Wall-clock budget for the whole run; teardown starts when it expires.
    pub run_deadline_secs: Option<u64>,
}

impl RunnerConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("lr-runner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the fields that must never be blank. Network selection is
    /// checked separately when a run starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.test_name,
            &FieldMetadata::new("test name", "LR_TEST_NAME", "test_name"),
        )?;
        require_field(
            &self.runner_image_path,
            &FieldMetadata::new(
                "runner image path",
                "LR_RUNNER_IMAGE_PATH",
                "runner_image_path",
            ),
        )?;
        require_field(
            &self.agent_image_path,
            &FieldMetadata::new("agent image path", "LR_AGENT_IMAGE_PATH", "agent_image_path"),
        )?;
        require_field(
            &self.settings_template,
            &FieldMetadata::new(
                "settings template",
                "LR_SETTINGS_TEMPLATE",
                "settings_template",
            ),
        )?;
        require_field(
            &self.test_template,
            &FieldMetadata::new("test template", "LR_TEST_TEMPLATE", "test_template"),
        )?;
        require_field(
            &self.artifact_dir,
            &FieldMetadata::new("artifact directory", "LR_ARTIFACT_DIR", "artifact_dir"),
        )?;
        if self.boot_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "boot_timeout_secs must be greater than zero (LR_BOOT_TIMEOUT_SECS)",
            )));
        }
        Ok(())
    }

    /// Returns the configured network identifier, ignoring blank values.
    #[must_use]
    pub fn network_id(&self) -> Option<&str> {
        non_blank(self.management_net_id.as_deref())
    }

    /// Returns the configured network name, ignoring blank values.
    #[must_use]
    pub fn network_name(&self) -> Option<&str> {
        non_blank(self.management_net_name.as_deref())
    }

    /// Returns the configured CIDR override, ignoring blank values.
    #[must_use]
    pub fn network_cidr(&self) -> Option<&str> {
        non_blank(self.management_net_cidr.as_deref())
    }

    /// Returns the configured floating IP pool, ignoring blank values.
    #[must_use]
    pub fn floating_ip_pool(&self) -> Option<&str> {
        non_blank(self.floating_ip_pool.as_deref())
    }

    /// Returns the artifact directory as a UTF-8 path.
    #[must_use]
    pub fn artifact_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.artifact_dir.trim())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
