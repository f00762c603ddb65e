//! Entry points: resolve hosts, build the plan, run it.

use serde::Serialize;

use crate::checkout::GitRemoteCache;
use crate::config::{DeployConfig, Server};
use crate::error::{Error, Result};
use crate::hooks::{ExecutionPlan, Phase};
use crate::lifecycle::StandardLifecycle;
use crate::pipeline::{run_plan, DeployRunResult, StepHandler};
use crate::release::{ReleaseHistory, ReleaseStore};
use crate::remote::RemoteExecutor;
use crate::ssh::SshClient;
use crate::tags::Attribution;
use crate::tasks::DeploySteps;

/// Servers to act on: all configured servers, or the named subset.
pub fn select_servers<'a>(config: &'a DeployConfig, hosts: &[String]) -> Result<Vec<&'a Server>> {
    if config.servers.is_empty() {
        return Err(Error::validation_invalid_argument(
            "servers",
            "No servers configured",
            None,
            None,
        )
        .with_hint("Add at least one {\"host\", \"user\"} entry to \"servers\" in deckhand.json"));
    }

    if hosts.is_empty() {
        return Ok(config.servers.iter().collect());
    }

    if let Some(unknown) = hosts
        .iter()
        .find(|h| !config.servers.iter().any(|s| &s.host == *h))
    {
        return Err(Error::validation_invalid_argument(
            "host",
            format!("Host '{}' is not in the configured servers", unknown),
            Some(unknown.clone()),
            Some(config.servers.iter().map(|s| s.host.clone()).collect()),
        ));
    }

    Ok(config
        .servers
        .iter()
        .filter(|s| hosts.contains(&s.host))
        .collect())
}

/// One SSH executor per selected server.
pub fn connect(config: &DeployConfig, hosts: &[String]) -> Result<Vec<Box<dyn RemoteExecutor>>> {
    select_servers(config, hosts)?
        .into_iter()
        .map(|server| SshClient::from_server(server).map(|c| Box::new(c) as Box<dyn RemoteExecutor>))
        .collect()
}

/// Compile the plan for `phases` and run it on `executors`.
pub fn run(
    config: &DeployConfig,
    phases: &[Phase],
    executors: &[Box<dyn RemoteExecutor>],
    handler: &dyn StepHandler,
) -> Result<DeployRunResult> {
    let plan = ExecutionPlan::for_phases(phases)?;

    log_status!(
        "deploy",
        "{} ({}) on {} host(s): {}",
        config.application,
        config.stage,
        executors.len(),
        plan.names().join(" -> ")
    );

    let result = run_plan(&plan, config, executors, handler);

    if result.success {
        log_status!("deploy", "Done");
    } else {
        log_status!("deploy", "Aborted on {}", result.aborted_hosts().join(", "));
    }

    Ok(result)
}

fn standard_steps(config: &DeployConfig, with_checkout: bool) -> Result<DeploySteps> {
    let mut lifecycle = StandardLifecycle::new();
    if with_checkout {
        lifecycle = lifecycle.with_checkout(Box::new(GitRemoteCache::from_config(config)?));
    }
    Ok(DeploySteps::new(
        Box::new(lifecycle),
        Attribution::from_local_git(),
    ))
}

fn run_standard(config: &DeployConfig, phases: &[Phase], hosts: &[String]) -> Result<DeployRunResult> {
    let handler = standard_steps(config, phases.contains(&Phase::Update))?;
    let executors = connect(config, hosts)?;
    run(config, phases, &executors, &handler)
}

/// Full deploy: setup, update, symlink, cleanup, with every hook.
pub fn deploy(config: &DeployConfig, hosts: &[String]) -> Result<DeployRunResult> {
    run_standard(config, &Phase::DEPLOY, hosts)
}

/// Prepare hosts: directory skeleton, then database creation.
pub fn setup(config: &DeployConfig, hosts: &[String]) -> Result<DeployRunResult> {
    run_standard(config, &[Phase::Setup], hosts)
}

/// Remove old releases and their tags.
pub fn cleanup(config: &DeployConfig, hosts: &[String]) -> Result<DeployRunResult> {
    run_standard(config, &[Phase::Cleanup], hosts)
}

pub fn plan(phases: &[Phase]) -> Result<ExecutionPlan> {
    ExecutionPlan::for_phases(phases)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReleases {
    pub host: String,
    pub releases: ReleaseHistory,
}

/// Release history of each host, oldest first.
pub fn releases(config: &DeployConfig, hosts: &[String]) -> Result<Vec<HostReleases>> {
    list_releases(config, &connect(config, hosts)?)
}

pub fn list_releases(
    config: &DeployConfig,
    executors: &[Box<dyn RemoteExecutor>],
) -> Result<Vec<HostReleases>> {
    executors
        .iter()
        .map(|executor| {
            let releases = ReleaseStore::new(executor.as_ref(), &config.layout).history()?;
            Ok(HostReleases {
                host: executor.host().to_string(),
                releases,
            })
        })
        .collect()
}
