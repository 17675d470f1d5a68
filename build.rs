//! Build script for generating the `knife-euca` man pages.
//!
//! One page is rendered for the top-level command and one for every nested
//! subcommand (`knife-euca-server-create.1`), written to the build output
//! directory for packaging.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: clap::Command, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    let page_name = command
        .get_display_name()
        .unwrap_or_else(|| command.get_name())
        .to_owned();
    Man::new(command.clone()).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{page_name}.1")), buffer)?;

    for sub in command.get_subcommands().filter(|sub| sub.get_name() != "help") {
        let name = format!("{page_name}-{}", sub.get_name());
        render(sub.clone().display_name(name), out_dir)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let mut command = Cli::command();
    command.build();
    render(command, &out_dir)
}
