use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{cleanup, deploy, plan, releases, setup};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(version = VERSION)]
#[command(about = "Release-based deployment orchestration over SSH")]
struct Cli {
    /// Path to the deploy configuration
    #[arg(long, short = 'c', global = true, default_value = deckhand::config::CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new release to every configured host
    Deploy(deploy::DeployArgs),
    /// Prepare hosts: directory skeleton and database
    Setup(setup::SetupArgs),
    /// Remove releases and tags outside the retention window
    Cleanup(cleanup::CleanupArgs),
    /// Show the ordered steps a command would run
    Plan(plan::PlanArgs),
    /// List releases present on each host
    Releases(releases::ReleasesArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs { config: cli.config };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
