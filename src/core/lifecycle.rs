//! Bodies of the four generic deploy phases.
//!
//! The hook graph decides when these run; this module decides what they do.
//! [`StandardLifecycle`] is the releases model: a directory skeleton at setup,
//! a fresh timestamped release per update, an atomic `current` switch, and
//! removal of release directories outside the retention window.

use serde::Serialize;

use crate::checkout::Checkout;
use crate::error::{Error, Result};
use crate::hooks::Phase;
use crate::pipeline::{HostContext, StepOutcome};
use crate::release::{new_identifier, ReleaseStore};
use crate::remote::{run_checked, RemoteCommand};

pub trait Lifecycle: Send + Sync {
    fn setup(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome>;
    fn update(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome>;
    fn symlink(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome>;
    fn cleanup(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome>;

    fn run_phase(&self, phase: Phase, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        match phase {
            Phase::Setup => self.setup(ctx),
            Phase::Update => self.update(ctx),
            Phase::Symlink => self.symlink(ctx),
            Phase::Cleanup => self.cleanup(ctx),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub keep: usize,
    pub removed: Vec<String>,
}

#[derive(Default)]
pub struct StandardLifecycle {
    checkout: Option<Box<dyn Checkout>>,
}

impl StandardLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy used by the update phase. Without one, update fails.
    pub fn with_checkout(mut self, checkout: Box<dyn Checkout>) -> Self {
        self.checkout = Some(checkout);
        self
    }
}

impl Lifecycle for StandardLifecycle {
    /// Create the deploy root, releases, shared, and shared children, then
    /// hand them to the runner group. Safe to re-run.
    fn setup(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        let dirs = ctx.config.setup_dirs();
        let sudo = ctx.config.use_sudo;

        run_checked(
            ctx.executor,
            &RemoteCommand::new("mkdir")
                .arg("-p")
                .args(dirs.iter().cloned())
                .sudo(sudo),
        )?;
        run_checked(
            ctx.executor,
            &RemoteCommand::new("chgrp")
                .args(["-R", ctx.config.runner_group.as_str()])
                .args(dirs.iter().cloned())
                .sudo(sudo),
        )?;
        run_checked(
            ctx.executor,
            &RemoteCommand::new("chmod")
                .args(["-R", "g+w"])
                .args(dirs.iter().cloned())
                .sudo(sudo),
        )?;

        Ok(StepOutcome::new(format!("prepared {} directories", dirs.len())).with_data(&dirs))
    }

    fn update(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        let checkout = self
            .checkout
            .as_ref()
            .ok_or_else(|| Error::config_missing_key("repository", None))?;
        let layout = &ctx.config.layout;
        let store = ReleaseStore::new(ctx.executor, layout);

        let identifier = new_identifier();
        store.ensure_absent(&identifier)?;

        let release_path = layout.release_dir(&identifier);
        log_status!("deploy", "{}: checking out release {}", ctx.host(), identifier);
        let revision = checkout.checkout(ctx.executor, &release_path)?;

        let release = store.record_release(&identifier, &revision)?;
        let outcome =
            StepOutcome::new(format!("release {} at {}", identifier, revision)).with_data(&release);
        ctx.release = Some(release);
        Ok(outcome)
    }

    /// Point `current` at the new release.
    fn symlink(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        let release = ctx.release()?;
        let current = ctx.config.layout.current.as_str();

        run_checked(
            ctx.executor,
            &RemoteCommand::new("ln").args(["-sfn", release.path.as_str(), current]),
        )?;

        Ok(StepOutcome::new(format!("{} -> {}", current, release.path)))
    }

    /// Remove release directories outside the retention window.
    ///
    /// The newest release is never removed, even with `keepReleases` at 0;
    /// tags follow the configured window exactly.
    fn cleanup(&self, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        let store = ReleaseStore::new(ctx.executor, &ctx.config.layout);
        let history = store.history()?;
        ctx.history = Some(history.clone());

        let keep = ctx.config.keep_releases.max(1);
        let stale: Vec<String> = history
            .older_than_last(keep)
            .iter()
            .map(|r| r.path.clone())
            .collect();

        if stale.is_empty() {
            log_status!("releases", "{}: no old releases to clean up", ctx.host());
            return Ok(StepOutcome::new("no old releases to clean up").with_data(&CleanupReport {
                keep,
                removed: Vec::new(),
            }));
        }

        log_status!(
            "releases",
            "{}: keeping {} of {} releases",
            ctx.host(),
            keep,
            history.len()
        );
        run_checked(
            ctx.executor,
            &RemoteCommand::new("rm")
                .arg("-rf")
                .args(stale.iter().cloned())
                .sudo(ctx.config.use_sudo),
        )?;

        let report = CleanupReport {
            keep,
            removed: stale,
        };
        Ok(StepOutcome::new(format!("removed {} releases", report.removed.len())).with_data(&report))
    }
}
