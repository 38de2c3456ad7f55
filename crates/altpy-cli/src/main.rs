use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod completion;
mod dispatch;
mod logging;
mod net;
mod prompt;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "altpy")]
#[command(about = "Build and manage side-by-side CPython installs", long_about = None)]
#[command(version)]
struct Cli {
    /// Root for installs, aliases and state (defaults to ALTPY_HOME or ~/.altpy).
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Answer yes to every confirmation prompt.
    #[arg(short = 'y', long, global = true)]
    yes: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download, build and alias a CPython release.
    Install {
        version: String,
        /// Parallel build jobs; probed from the host when omitted.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        jobs: Option<u32>,
        /// Expected SHA-256 of the source archive.
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Delete an installed version and its aliases.
    Remove { version: String },
    /// Delete every installed version and any leftovers.
    Clean,
    /// Show installed versions.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show versions published upstream.
    Available,
    Doctor,
    /// Print shell setup that puts the alias directory on PATH.
    InitShell {
        #[arg(long, value_enum)]
        shell: Option<CliCompletionShell>,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    dispatch::run_cli(cli)
}

#[cfg(test)]
mod tests;
