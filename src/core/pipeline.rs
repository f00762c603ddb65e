//! Runs an [`ExecutionPlan`] against every configured host.
//!
//! Hosts run in parallel, one scoped thread each; a host's steps run strictly
//! in plan order. A failed abort-class step stops its host and raises a shared
//! halt flag: every other host finishes the step it is on, then records the
//! rest of its plan as skipped. Nothing already done is undone.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::hooks::{ExecutionPlan, FailurePolicy, PlannedStep, Step, StepKind};
use crate::release::{Release, ReleaseHistory};
use crate::remote::RemoteExecutor;

/// Halt flag for contexts that run outside [`run_plan`].
static NEVER_HALTED: AtomicBool = AtomicBool::new(false);

/// Per-host state threaded through one run of a plan.
pub struct HostContext<'a> {
    pub executor: &'a dyn RemoteExecutor,
    pub config: &'a DeployConfig,
    /// Release created by the update phase of this run.
    pub release: Option<Release>,
    /// History as it stood before the cleanup phase removed anything.
    pub history: Option<ReleaseHistory>,
    halt: &'a AtomicBool,
}

impl<'a> HostContext<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, config: &'a DeployConfig) -> Self {
        Self {
            executor,
            config,
            release: None,
            history: None,
            halt: &NEVER_HALTED,
        }
    }

    fn with_halt(mut self, halt: &'a AtomicBool) -> Self {
        self.halt = halt;
        self
    }

    pub fn host(&self) -> &str {
        self.executor.host()
    }

    /// Whether another host has aborted this run. This host stops after its current step.
    pub fn halt_requested(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    /// The release this run created. Steps after the update phase need it.
    pub fn release(&self) -> Result<&Release> {
        self.release.as_ref().ok_or_else(|| {
            Error::internal_unexpected(format!(
                "No release has been created on {} in this run",
                self.host()
            ))
        })
    }
}

/// What a successful step reports.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub message: String,
    pub data: Option<Value>,
}

impl StepOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

/// Executes the body of one step. Shared by every host thread.
pub trait StepHandler: Send + Sync {
    fn run_step(&self, step: Step, ctx: &mut HostContext<'_>) -> Result<StepOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl From<&Error> for StepError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: &'static str,
    pub kind: StepKind,
    pub policy: FailurePolicy,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    fn new(planned: &PlannedStep, status: StepStatus) -> Self {
        Self {
            step: planned.name,
            kind: planned.kind,
            policy: planned.policy,
            status,
            message: None,
            data: None,
            error: None,
        }
    }

    fn skipped(planned: &PlannedStep, reason: &str) -> Self {
        Self {
            message: Some(reason.to_string()),
            ..Self::new(planned, StepStatus::Skipped)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Every step ran; continue-class failures may be among them.
    Completed,
    /// An abort-class step failed on this host.
    Aborted,
    /// Stopped because another host aborted.
    Halted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRunResult {
    pub host: String,
    pub status: HostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,
    pub steps: Vec<StepResult>,
}

impl HostRunResult {
    /// Continue-class steps that failed without stopping the host.
    pub fn tolerated_failures(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed && s.policy == FailurePolicy::Continue)
            .map(|s| s.step)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub hosts: usize,
    pub completed: usize,
    pub aborted: usize,
    pub halted: usize,
    pub succeeded_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRunResult {
    pub success: bool,
    pub plan: Vec<&'static str>,
    pub hosts: Vec<HostRunResult>,
    pub summary: RunSummary,
}

impl DeployRunResult {
    /// Hosts on which an abort-class step failed.
    pub fn aborted_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|h| h.status == HostStatus::Aborted)
            .map(|h| h.host.clone())
            .collect()
    }
}

/// Run `plan` on every host in parallel and collect the results in host order.
pub fn run_plan(
    plan: &ExecutionPlan,
    config: &DeployConfig,
    executors: &[Box<dyn RemoteExecutor>],
    handler: &dyn StepHandler,
) -> DeployRunResult {
    let halt = AtomicBool::new(false);

    let hosts: Vec<HostRunResult> = thread::scope(|scope| {
        let handles: Vec<_> = executors
            .iter()
            .map(|executor| {
                let halt = &halt;
                let executor = executor.as_ref();
                let host = executor.host().to_string();
                let handle = scope.spawn(move || run_host(plan, config, executor, handler, halt));
                (host, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(host, handle)| {
                handle.join().unwrap_or_else(|_| {
                    halt.store(true, Ordering::SeqCst);
                    log_status!("deploy", "{}: worker thread panicked", host);
                    HostRunResult {
                        host,
                        status: HostStatus::Aborted,
                        release: None,
                        steps: Vec::new(),
                    }
                })
            })
            .collect()
    });

    let summary = build_summary(&hosts);
    DeployRunResult {
        success: summary.aborted == 0 && summary.halted == 0,
        plan: plan.names(),
        hosts,
        summary,
    }
}

fn run_host(
    plan: &ExecutionPlan,
    config: &DeployConfig,
    executor: &dyn RemoteExecutor,
    handler: &dyn StepHandler,
    halt: &AtomicBool,
) -> HostRunResult {
    let mut ctx = HostContext::new(executor, config).with_halt(halt);
    let mut steps = Vec::with_capacity(plan.len());
    let mut status = HostStatus::Completed;

    for planned in plan.steps() {
        if status == HostStatus::Aborted {
            steps.push(StepResult::skipped(planned, "skipped after abort on this host"));
            continue;
        }
        if ctx.halt_requested() {
            status = HostStatus::Halted;
            steps.push(StepResult::skipped(planned, "skipped after abort on another host"));
            continue;
        }

        log_status!("hook", "{}: {}", ctx.host(), planned.name);

        match handler.run_step(planned.step, &mut ctx) {
            Ok(outcome) => {
                let mut result = StepResult::new(planned, StepStatus::Success);
                if !outcome.message.is_empty() {
                    result.message = Some(outcome.message);
                }
                result.data = outcome.data;
                steps.push(result);
            }
            Err(err) => {
                let mut result = StepResult::new(planned, StepStatus::Failed);
                result.error = Some(StepError::from(&err));

                match planned.policy {
                    FailurePolicy::Continue => {
                        log_status!(
                            "hook",
                            "{}: {} failed, continuing: {}",
                            ctx.host(),
                            planned.name,
                            err.message
                        );
                    }
                    FailurePolicy::Abort => {
                        log_status!(
                            "deploy",
                            "{}: {} failed, aborting: {}",
                            ctx.host(),
                            planned.name,
                            err.message
                        );
                        status = HostStatus::Aborted;
                        halt.store(true, Ordering::SeqCst);
                    }
                }
                steps.push(result);
            }
        }
    }

    HostRunResult {
        host: ctx.host().to_string(),
        status,
        release: ctx.release.take(),
        steps,
    }
}

fn build_summary(hosts: &[HostRunResult]) -> RunSummary {
    let count_hosts = |status: HostStatus| hosts.iter().filter(|h| h.status == status).count();
    let count_steps = |status: StepStatus| {
        hosts
            .iter()
            .flat_map(|h| h.steps.iter())
            .filter(|s| s.status == status)
            .count()
    };

    RunSummary {
        hosts: hosts.len(),
        completed: count_hosts(HostStatus::Completed),
        aborted: count_hosts(HostStatus::Aborted),
        halted: count_hosts(HostStatus::Halted),
        succeeded_steps: count_steps(StepStatus::Success),
        failed_steps: count_steps(StepStatus::Failed),
        skipped_steps: count_steps(StepStatus::Skipped),
    }
}

/// Error for a run in which at least one host aborted.
pub fn halted_error(result: &DeployRunResult) -> Option<Error> {
    let aborted = result.aborted_hosts();
    if aborted.is_empty() {
        return None;
    }

    let mut err = Error::deploy_halted(aborted);
    if let Some(first) = result
        .hosts
        .iter()
        .flat_map(|h| h.steps.iter().map(move |s| (h, s)))
        .find(|(_, s)| s.status == StepStatus::Failed && s.policy == FailurePolicy::Abort)
    {
        let (host, step) = first;
        let cause = step
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        err = Error::deploy_step_failed(step.step, &host.host, cause)
            .with_hint(err.message.clone());
    }
    Some(err)
}
