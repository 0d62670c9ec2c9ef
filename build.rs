//! Generates the `lr-runner.1` manual page into `OUT_DIR`.

use std::env;
use std::io::{self, Write};

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "lr-runner.1";

fn out_dir() -> io::Result<Utf8PathBuf> {
    let raw = env::var_os("OUT_DIR")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;
    Utf8PathBuf::from_path_buf(raw.into())
        .map_err(|path| io::Error::new(io::ErrorKind::InvalidData, path.display().to_string()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;

    let dir = Dir::open_ambient_dir(out_dir()?, ambient_authority())?;
    dir.write(MAN_PAGE, &page)?;
    Ok(())
}
