//! `$NAME` placeholder substitution for the generated configuration files.
//!
//! Placeholders follow the shell-like convention: `$NAME` or `${NAME}` with
//! `NAME` matching `[A-Za-z_][A-Za-z0-9_]*`, and `$$` producing a literal
//! dollar sign. Only the variables enumerated by [`TemplateVars`] are
//! available; any other placeholder is an error.

use thiserror::Error;

/// Errors raised while rendering a template.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TemplateError {
    /// Raised when a placeholder names a variable outside the known set.
    #[error("unknown placeholder ${name} on line {line}")]
    UnknownVariable {
        /// Placeholder name.
        name: String,
        /// One-based line number.
        line: usize,
    },
    /// Raised when `$` is followed by something that is not a placeholder.
    #[error("invalid placeholder on line {line}")]
    InvalidPlaceholder {
        /// One-based line number.
        line: usize,
    },
}

/// Values substituted into the settings and test templates.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct TemplateVars {
    /// `CONTROLLER_IP`.
    pub controller_ip: String,
    /// `OS_TENANT_NAME`.
    pub tenant_name: String,
    /// `OS_USERNAME`.
    pub username: String,
    /// `OS_PASSWORD`.
    pub password: String,
    /// `OS_AUTH_URL`.
    pub auth_url: String,
    /// `OS_REGION_NAME`.
    pub region: String,
    /// `OS_TOKEN`.
    pub token: String,
    /// `MANAGEMENT_NET_NAME`.
    pub management_net_name: String,
    /// `MANAGEMENT_NET_CIDR`.
    pub management_net_cidr: String,
    /// `MANAGEMENT_NET_ID`.
    pub management_net_id: String,
    /// `AGENT_IMAGE_ID`.
    pub agent_image_id: String,
    /// `AGENT_FLAVOR_ID`.
    pub agent_flavor_id: String,
    /// `TEST_NAME`.
    pub test_name: String,
    /// `TEST_NET_NAME`.
    pub test_net_name: String,
    /// `IPERF_ARGS`.
    pub iperf_args: String,
    /// `LOADRUNNER_USER`.
    pub loadrunner_user: String,
    /// `LOADRUNNER_IMAGE_NAME`, the local runner image path.
    pub runner_image_path: String,
    /// `AGENT_IMAGE_NAME`, the local agent image path.
    pub agent_image_path: String,
    /// `UBUNTU_IMAGE_URL`.
    pub ubuntu_image_url: String,
    /// `SETTINGS_TEMPLATE`.
    pub settings_template: String,
    /// `SETTINGS_REMOTE_PATH`.
    pub settings_remote_path: String,
    /// `TEST_TEMPLATE`.
    pub test_template: String,
    /// `TEST_REMOTE_PATH`.
    pub test_remote_path: String,
    /// `UUID`.
    pub run_id: String,
}

impl std::fmt::Debug for TemplateVars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateVars")
            .field("controller_ip", &self.controller_ip)
            .field("auth_url", &self.auth_url)
            .field("management_net_id", &self.management_net_id)
            .field("agent_image_id", &self.agent_image_id)
            .field("agent_flavor_id", &self.agent_flavor_id)
            .field("test_name", &self.test_name)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl TemplateVars {
    /// Placeholder names accepted by [`TemplateVars::lookup`].
    pub const NAMES: [&'static str; 24] = [
        "CONTROLLER_IP",
        "OS_TENANT_NAME",
        "OS_USERNAME",
        "OS_PASSWORD",
        "OS_AUTH_URL",
        "OS_REGION_NAME",
        "OS_TOKEN",
        "MANAGEMENT_NET_NAME",
        "MANAGEMENT_NET_CIDR",
        "MANAGEMENT_NET_ID",
        "AGENT_IMAGE_ID",
        "AGENT_FLAVOR_ID",
        "TEST_NAME",
        "TEST_NET_NAME",
        "IPERF_ARGS",
        "LOADRUNNER_USER",
        "LOADRUNNER_IMAGE_NAME",
        "AGENT_IMAGE_NAME",
        "UBUNTU_IMAGE_URL",
        "SETTINGS_TEMPLATE",
        "SETTINGS_REMOTE_PATH",
        "TEST_TEMPLATE",
        "TEST_REMOTE_PATH",
        "UUID",
    ];

    /// Returns the value bound to a placeholder name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let value = match name {
            "CONTROLLER_IP" => &self.controller_ip,
            "OS_TENANT_NAME" => &self.tenant_name,
            "OS_USERNAME" => &self.username,
            "OS_PASSWORD" => &self.password,
            "OS_AUTH_URL" => &self.auth_url,
            "OS_REGION_NAME" => &self.region,
            "OS_TOKEN" => &self.token,
            "MANAGEMENT_NET_NAME" => &self.management_net_name,
            "MANAGEMENT_NET_CIDR" => &self.management_net_cidr,
            "MANAGEMENT_NET_ID" => &self.management_net_id,
            "AGENT_IMAGE_ID" => &self.agent_image_id,
            "AGENT_FLAVOR_ID" => &self.agent_flavor_id,
            "TEST_NAME" => &self.test_name,
            "TEST_NET_NAME" => &self.test_net_name,
            "IPERF_ARGS" => &self.iperf_args,
            "LOADRUNNER_USER" => &self.loadrunner_user,
            "LOADRUNNER_IMAGE_NAME" => &self.runner_image_path,
            "AGENT_IMAGE_NAME" => &self.agent_image_path,
            "UBUNTU_IMAGE_URL" => &self.ubuntu_image_url,
            "SETTINGS_TEMPLATE" => &self.settings_template,
            "SETTINGS_REMOTE_PATH" => &self.settings_remote_path,
            "TEST_TEMPLATE" => &self.test_template,
            "TEST_REMOTE_PATH" => &self.test_remote_path,
            "UUID" => &self.run_id,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Substitutes every placeholder in `template`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] on unknown or malformed placeholders.
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        let mut line = 1;

        while let Some(ch) = chars.next() {
            if ch != '$' {
                if ch == '\n' {
                    line += 1;
                }
                out.push(ch);
                continue;
            }

            let name = match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('{') => {
                    chars.next();
                    let name = take_identifier(&mut chars);
                    if name.is_empty() || chars.next() != Some('}') {
                        return Err(TemplateError::InvalidPlaceholder { line });
                    }
                    name
                }
                Some(next) if is_identifier_start(next) => take_identifier(&mut chars),
                _ => return Err(TemplateError::InvalidPlaceholder { line }),
            };

            let value = self
                .lookup(&name)
                .ok_or(TemplateError::UnknownVariable { name, line })?;
            out.push_str(value);
        }

        Ok(out)
    }
}

const fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn take_identifier(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    if let Some(first) = chars.next_if(|ch| is_identifier_start(*ch)) {
        name.push(first);
        while let Some(next) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
            name.push(next);
        }
    }
    name
}
