//! Secure shell client settings.
//!
//! [`ShellConfig`] is loaded via `ortho-config`, merging defaults, the shared
//! `lr-runner.toml` discovery, and `LR_SSH_*` environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::ConfigError;

/// Settings for the system `ssh` and `scp` clients.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LR_SSH",
    discovery(
        app_name = "lr-runner",
        env_var = "LR_RUNNER_CONFIG_PATH",
        config_file_name = "lr-runner.toml",
        dotfile_name = ".lr-runner.toml",
        project_file_name = "lr-runner.toml"
    )
)]
pub struct ShellConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub client_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub copy_bin: String,
    /// Remote user baked into the runner image.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Whether to force batch mode to avoid password prompts.
    #[ortho_config(default = true)]
    pub batch_mode: bool,
    /// Whether to enforce host key checking; ephemeral hosts default to off.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Per-attempt TCP connect timeout passed to the client.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Lifetime of the multiplexed master connection once idle.
    #[ortho_config(default = 600)]
    pub control_persist_secs: u64,
}

impl ShellConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("lr-runner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures the binaries and user are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the variable to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&self.client_bin, "client_bin"),
            (&self.copy_bin, "copy_bin"),
            (&self.user, "user"),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "missing {field}: set LR_SSH_{} or add {field} to lr-runner.toml",
                    field.to_uppercase()
                )));
            }
        }
        Ok(())
    }
}
