use clap::{Args, ValueEnum};
use serde::Serialize;

use deckhand::hooks::{ExecutionPlan, Phase};

use super::CmdResult;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PlanTarget {
    Deploy,
    Setup,
    Cleanup,
}

impl PlanTarget {
    fn phases(self) -> &'static [Phase] {
        match self {
            PlanTarget::Deploy => &Phase::DEPLOY,
            PlanTarget::Setup => &[Phase::Setup],
            PlanTarget::Cleanup => &[Phase::Cleanup],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PlanTarget::Deploy => "deploy",
            PlanTarget::Setup => "setup",
            PlanTarget::Cleanup => "cleanup",
        }
    }
}

#[derive(Args)]
pub struct PlanArgs {
    /// Command to plan
    #[arg(value_enum, default_value = "deploy")]
    pub target: PlanTarget,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub command: String,
    pub plan: ExecutionPlan,
}

pub fn run_json(args: PlanArgs) -> CmdResult<PlanOutput> {
    let plan = deckhand::deploy::plan(args.target.phases())?;

    Ok((
        PlanOutput {
            command: args.target.as_str().to_string(),
            plan,
        },
        0,
    ))
}
