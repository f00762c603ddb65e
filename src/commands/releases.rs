use clap::Args;
use serde::Serialize;

use deckhand::deploy::{self, HostReleases};

use super::CmdResult;

#[derive(Args)]
pub struct ReleasesArgs {
    /// Limit the listing to these hosts (repeatable)
    #[arg(long = "host")]
    pub hosts: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasesOutput {
    pub keep_releases: usize,
    pub hosts: Vec<HostReleases>,
}

pub fn run(args: ReleasesArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ReleasesOutput> {
    let config = global.load_config()?;
    let hosts = deploy::releases(&config, &args.hosts)?;

    Ok((
        ReleasesOutput {
            keep_releases: config.keep_releases,
            hosts,
        },
        0,
    ))
}
