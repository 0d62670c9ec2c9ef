//! Binary entry point for the lr-runner CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use lr_runner::{
    OpenStackBackend, OpenStackConfig, OpenStackError, ProcessCommandRunner, RunError, RunId,
    RunOrchestrator, RunnerConfig, SecureShellConnector, ShellConfig, TeardownReport,
};

mod cli;

use cli::{Cli, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("run failed: {0}")]
    Run(#[from] RunError<OpenStackError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    let openstack = OpenStackConfig::load_without_cli_args().map_err(config_error)?;
    openstack.validate().map_err(config_error)?;
    let runner = RunnerConfig::load_without_cli_args().map_err(config_error)?;
    runner.validate().map_err(config_error)?;
    let shell = ShellConfig::load_without_cli_args().map_err(config_error)?;
    shell.validate().map_err(config_error)?;

    let run_id = match args.run_id {
        Some(value) => RunId::new(value).map_err(config_error)?,
        None => RunId::generate(),
    };
    let deadline = args
        .deadline_secs
        .or(runner.run_deadline_secs)
        .map(Duration::from_secs);

    let backend = OpenStackBackend::new(openstack.clone()).map_err(config_error)?;
    let connector = SecureShellConnector::new(shell, ProcessCommandRunner);
    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, deadline);

    let orchestrator = RunOrchestrator::new(backend, openstack, runner, connector)
        .with_cancellation(cancel.clone());
    let report = orchestrator.execute(run_id).await;
    cancel.cancel();

    report_teardown(&report.teardown);
    let summary = report.outcome?;
    writeln!(
        io::stdout(),
        "run {} finished; logs in {}",
        report.run_id,
        summary
            .settings_file
            .parent()
            .map_or_else(|| String::from("."), ToString::to_string)
    )
    .ok();
    Ok(0)
}

fn config_error(err: impl std::fmt::Display) -> CliError {
    CliError::Config(err.to_string())
}

/// Cancels `cancel` on Ctrl-C or when the optional deadline elapses.
fn spawn_cancel_triggers(cancel: &CancellationToken, deadline: Option<Duration>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = on_signal.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("interrupt received; cancelling run");
                    on_signal.cancel();
                }
            }
        }
    });

    if let Some(limit) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = on_deadline.cancelled() => {}
                () = tokio::time::sleep(limit) => {
                    warn!(deadline_secs = limit.as_secs(), "run deadline reached; cancelling");
                    on_deadline.cancel();
                }
            }
        });
    }
}

fn report_teardown(report: &TeardownReport) {
    if report.is_clean() {
        info!(released = report.released.len(), "all created resources released");
        return;
    }
    let mut stderr = io::stderr();
    for failure in &report.failures {
        writeln!(stderr, "warning: {failure}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
