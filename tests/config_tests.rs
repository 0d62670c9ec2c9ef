//! Integration tests for configuration loading and validation.

use lr_runner::config::ConfigError;
use lr_runner::test_support::{EnvGuard, openstack_config, runner_config, shell_config};
use lr_runner::{OpenStackConfig, RunnerConfig, ShellConfig};
use rstest::*;
use tempfile::TempDir;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

const RUNNER_VARS: &[&str] = &[
    "LR_MANAGEMENT_NET_NAME",
    "LR_MANAGEMENT_NET_ID",
    "LR_MANAGEMENT_NET_CIDR",
    "LR_TEST_NAME",
    "LR_BOOT_TIMEOUT_SECS",
    "LR_RUN_DEADLINE_SECS",
];

#[fixture]
fn valid_runner() -> RunnerConfig {
    runner_config(Utf8Path::new("/srv/lr"))
}

fn temp_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()))
}

#[rstest]
fn identity_validation_names_env_var_and_toml_key() {
    fn assert_actionable(
        mutate: impl FnOnce(&mut OpenStackConfig),
        env_var: &str,
        toml_key: &str,
    ) {
        let mut cfg = openstack_config();
        mutate(&mut cfg);
        let message = cfg
            .validate()
            .expect_err("validation should fail")
            .to_string();
        assert!(
            message.contains(env_var),
            "error should mention env var {env_var}: {message}"
        );
        assert!(
            message.contains(toml_key),
            "error should mention TOML key {toml_key}: {message}"
        );
    }

    assert_actionable(|cfg| cfg.tenant_name.clear(), "OS_TENANT_NAME", "tenant_name");
    assert_actionable(|cfg| cfg.username = String::from("  "), "OS_USERNAME", "username");
    assert_actionable(|cfg| cfg.password.clear(), "OS_PASSWORD", "password");
    assert_actionable(
        |cfg| {
            cfg.controller_ip = None;
            cfg.auth_url = None;
        },
        "OS_CONTROLLER_IP",
        "auth_url",
    );
}

#[rstest]
#[case(Some("192.0.2.1"), None, "http://192.0.2.1:5000/v2.0/")]
#[case(Some("192.0.2.1"), Some("https://keystone.example:5000/v2.0"), "https://keystone.example:5000/v2.0")]
#[case(None, Some("http://ctl:5000/v2.0/"), "http://ctl:5000/v2.0/")]
#[case(Some("192.0.2.1"), Some("   "), "http://192.0.2.1:5000/v2.0/")]
fn auth_url_prefers_explicit_endpoint(
    #[case] controller_ip: Option<&str>,
    #[case] auth_url: Option<&str>,
    #[case] expected: &str,
) {
    let cfg = OpenStackConfig {
        controller_ip: controller_ip.map(str::to_owned),
        auth_url: auth_url.map(str::to_owned),
        ..openstack_config()
    };
    assert_eq!(
        cfg.resolved_auth_url().expect("endpoint resolves"),
        expected
    );
}

#[rstest]
fn identity_debug_output_redacts_password() {
    let cfg = OpenStackConfig {
        password: String::from("s3cret-value"),
        ..openstack_config()
    };
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("s3cret-value"), "{rendered}");
    assert!(rendered.contains("<redacted>"));
}

#[rstest]
fn runner_validation_rejects_blank_test_name(valid_runner: RunnerConfig) {
    let cfg = RunnerConfig {
        test_name: String::from(" "),
        ..valid_runner
    };
    let ConfigError::MissingField(message) = cfg.validate().expect_err("test name required")
    else {
        panic!("expected MissingField error");
    };
    assert!(message.contains("LR_TEST_NAME"), "{message}");
    assert!(message.contains("lr-runner.toml"), "{message}");
}

#[rstest]
fn runner_validation_rejects_zero_boot_timeout(valid_runner: RunnerConfig) {
    let cfg = RunnerConfig {
        boot_timeout_secs: 0,
        ..valid_runner
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[rstest]
fn runner_accessors_ignore_blank_values(valid_runner: RunnerConfig) {
    let cfg = RunnerConfig {
        management_net_id: Some(String::from("  ")),
        management_net_cidr: Some(String::new()),
        floating_ip_pool: Some(String::from(" public ")),
        artifact_dir: String::from(" out "),
        ..valid_runner
    };
    assert_eq!(cfg.network_id(), None);
    assert_eq!(cfg.network_name(), Some("mgmt"));
    assert_eq!(cfg.network_cidr(), None);
    assert_eq!(cfg.floating_ip_pool(), Some("public"));
    assert_eq!(cfg.artifact_dir(), Utf8PathBuf::from("out"));
}

#[rstest]
fn shell_validation_names_the_variable() {
    let cfg = ShellConfig {
        copy_bin: String::new(),
        ..shell_config()
    };
    let message = cfg.validate().expect_err("copy_bin required").to_string();
    assert!(message.contains("LR_SSH_COPY_BIN"), "{message}");
}

#[rstest]
#[tokio::test]
async fn identity_settings_load_from_environment() {
    let _guard = EnvGuard::apply(
        &[
            ("OS_CONTROLLER_IP", "198.51.100.7"),
            ("OS_TENANT_NAME", "loadtest"),
            ("OS_REGION", "RegionTwo"),
        ],
        &[
            "OS_AUTH_URL",
            "OS_USERNAME",
            "OS_PASSWORD",
            "LR_RUNNER_CONFIG_PATH",
        ],
    )
    .await;

    let cfg = OpenStackConfig::load_without_cli_args().expect("identity settings load");

    assert_eq!(cfg.controller_ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(cfg.tenant_name, "loadtest");
    assert_eq!(cfg.region, "RegionTwo");
    assert_eq!(cfg.username, "admin");
    assert_eq!(
        cfg.resolved_auth_url().expect("derived endpoint"),
        "http://198.51.100.7:5000/v2.0/"
    );
}

#[rstest]
#[tokio::test]
async fn identity_settings_load_from_shared_config_file() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = temp_root(&tmp);
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(
            "lr-runner.toml",
            "controller_ip = \"203.0.113.5\"\ntenant_name = \"from-file\"\nmanagement_net_name = \"mgmt\"\n",
        )
        .unwrap_or_else(|err| panic!("write config file: {err}"));
    let config_path = root.join("lr-runner.toml");

    let _guard = EnvGuard::apply(
        &[
            ("LR_RUNNER_CONFIG_PATH", config_path.as_str()),
            ("OS_TENANT_NAME", "from-env"),
        ],
        &["OS_CONTROLLER_IP", "OS_AUTH_URL"],
    )
    .await;

    let cfg = OpenStackConfig::load_without_cli_args().expect("identity settings load");

    assert_eq!(cfg.controller_ip.as_deref(), Some("203.0.113.5"));
    assert_eq!(cfg.tenant_name, "from-env");
    cfg.validate().expect("file supplies the controller address");
}

#[rstest]
#[tokio::test]
async fn runner_settings_merge_file_and_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = temp_root(&tmp);
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(
            "lr-runner.toml",
            "management_net_name = \"mgmt-from-file\"\ntest_name = \"file-test\"\n",
        )
        .unwrap_or_else(|err| panic!("write config file: {err}"));
    let config_path = root.join("lr-runner.toml");

    let mut unset: Vec<&str> = RUNNER_VARS.to_vec();
    unset.retain(|var| *var != "LR_TEST_NAME" && *var != "LR_BOOT_TIMEOUT_SECS");
    let _guard = EnvGuard::apply(
        &[
            ("LR_RUNNER_CONFIG_PATH", config_path.as_str()),
            ("LR_TEST_NAME", "env-test"),
            ("LR_BOOT_TIMEOUT_SECS", "120"),
        ],
        &unset,
    )
    .await;

    let cfg = RunnerConfig::load_without_cli_args().expect("runner settings load");

    assert_eq!(cfg.network_name(), Some("mgmt-from-file"));
    assert_eq!(cfg.test_name, "env-test");
    assert_eq!(cfg.boot_timeout_secs, 120);
    assert_eq!(cfg.iperf_args, "['-t', '15']");
    assert!(
        cfg.ubuntu_image_url
            .ends_with("trusty-server-cloudimg-amd64-disk1.img"),
        "{}",
        cfg.ubuntu_image_url
    );
    assert_eq!(cfg.run_deadline_secs, None);
    cfg.validate().expect("merged settings validate");
}
