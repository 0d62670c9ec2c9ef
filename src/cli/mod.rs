//! Command-line interface definitions for the `lr-runner` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `lr-runner` binary.
#[derive(Debug, Parser)]
#[command(
    name = "lr-runner",
    about = "Provision an ephemeral OpenStack load-test environment, run the test, and tear it down",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision, run both test passes, and release every created resource.
    #[command(
        name = "run",
        about = "Provision, run both test passes, and release every created resource"
    )]
    Run(RunCommand),
}

/// Arguments for the `lr-runner run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Use a fixed run identifier instead of a random one.
    ///
    /// Every resource and artifact name carries this suffix. Only ASCII
    /// letters, digits, and `-` are accepted.
    #[arg(long, value_name = "ID")]
    pub(crate) run_id: Option<String>,
    /// Cancel the run after this many seconds; teardown still happens.
    ///
    /// Overrides `LR_RUN_DEADLINE_SECS`.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) deadline_secs: Option<u64>,
}
