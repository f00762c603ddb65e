use clap::Args;

use deckhand::deploy;

use super::deploy::RunOutput;
use super::CmdResult;

#[derive(Args)]
pub struct CleanupArgs {
    /// Limit cleanup to these hosts (repeatable)
    #[arg(long = "host")]
    pub hosts: Vec<String>,
}

pub fn run(args: CleanupArgs, global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let config = global.load_config()?;
    let result = deploy::cleanup(&config, &args.hosts)?;

    let output = RunOutput::new("cleanup", &config, result);
    let exit_code = output.exit_code();
    Ok((output, exit_code))
}
