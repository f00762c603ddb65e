use clap::Args;
use serde::Serialize;

use deckhand::deploy;
use deckhand::pipeline::{DeployRunResult, HostStatus};

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Limit the deploy to these hosts (repeatable)
    #[arg(long = "host")]
    pub hosts: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub command: String,
    pub application: String,
    pub stage: String,
    #[serde(flatten)]
    pub result: DeployRunResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl RunOutput {
    pub fn new(command: &str, config: &deckhand::config::DeployConfig, result: DeployRunResult) -> Self {
        let mut hints = Vec::new();
        for host in &result.hosts {
            let tolerated = host.tolerated_failures();
            if host.status == HostStatus::Completed && !tolerated.is_empty() {
                hints.push(format!(
                    "{}: {} failed but did not stop the deploy; check the step errors",
                    host.host,
                    tolerated.join(", ")
                ));
            }
        }
        if let Some(err) = deckhand::pipeline::halted_error(&result) {
            hints.extend(err.hints.into_iter().map(|h| h.message));
        }

        Self {
            command: command.to_string(),
            application: config.application.clone(),
            stage: config.stage.clone(),
            result,
            hints,
        }
    }

    /// Exit 1 when any host aborted; tolerated failures still exit 0.
    pub fn exit_code(&self) -> i32 {
        if self.result.success {
            0
        } else {
            1
        }
    }
}

pub fn run(args: DeployArgs, global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let config = global.load_config()?;
    let result = deploy::deploy(&config, &args.hosts)?;

    let output = RunOutput::new("deploy", &config, result);
    let exit_code = output.exit_code();
    Ok((output, exit_code))
}
