//! Hook bodies, and the handler that dispatches plan steps to them.

use crate::db;
use crate::error::{Error, Result};
use crate::hooks::{HookId, Step};
use crate::lifecycle::Lifecycle;
use crate::pipeline::{HostContext, StepHandler, StepOutcome};
use crate::release::ReleaseStore;
use crate::remote::run_checked;
use crate::settings::{database_substitutions, SettingsProvisioner};
use crate::shared::SharedLinker;
use crate::tags::{Attribution, TagManager};

/// Runs phase bodies through a [`Lifecycle`] and hooks through [`run_hook`].
pub struct DeploySteps {
    lifecycle: Box<dyn Lifecycle>,
    attribution: Attribution,
}

impl DeploySteps {
    pub fn new(lifecycle: Box<dyn Lifecycle>, attribution: Attribution) -> Self {
        Self {
            lifecycle,
            attribution,
        }
    }
}

impl StepHandler for DeploySteps {
    fn run_step(&self, step: Step, ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
        match step {
            Step::Phase(phase) => self.lifecycle.run_phase(phase, ctx),
            Step::Hook(hook) => run_hook(hook, ctx, &self.attribution),
        }
    }
}

pub fn run_hook(
    hook: HookId,
    ctx: &mut HostContext<'_>,
    attribution: &Attribution,
) -> Result<StepOutcome> {
    match hook {
        HookId::InitSettings => init_settings(ctx),
        HookId::SymlinkShared => symlink_shared(ctx),
        HookId::BackupDb => {
            let release = ctx.release()?;
            let timestamp = db::backup_timestamp();
            let cmd = db::backup_command(&release.path, &ctx.config.layout.shared, &timestamp);
            run_checked(ctx.executor, &cmd)?;
            Ok(StepOutcome::new(db::backup_path(
                &ctx.config.layout.shared,
                &timestamp,
            )))
        }
        HookId::Updatedb => {
            let release = ctx.release()?;
            run_checked(ctx.executor, &db::updatedb_command(&release.path))?;
            Ok(StepOutcome::new("database updated"))
        }
        HookId::CacheClear => {
            let release = ctx.release()?;
            run_checked(ctx.executor, &db::cache_clear_command(&release.path))?;
            Ok(StepOutcome::new("caches cleared"))
        }
        HookId::TagPush => {
            let release = ctx.release()?;
            let tag = TagManager::new(ctx.executor, &ctx.config.layout.repository_cache)
                .tag_release(release, attribution)?;
            Ok(StepOutcome::new(format!("pushed {}", tag.name)).with_data(&tag))
        }
        HookId::Createdb => {
            for cmd in db::createdb_commands(&ctx.config.db) {
                run_checked(ctx.executor, &cmd)?;
            }
            Ok(StepOutcome::new(format!("created database {}", ctx.config.db.name)))
        }
        HookId::TagCleanup => tag_cleanup(ctx),
    }
}

fn init_settings(ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
    let release = ctx.release()?;
    let template = ctx.config.settings_template_in(&release.path);

    let report = SettingsProvisioner::new(ctx.executor).ensure_settings_file(
        &template,
        &ctx.config.settings_path,
        &database_substitutions(&ctx.config.db),
    )?;

    let message = if report.initialized {
        format!("seeded {}", report.path)
    } else {
        format!("updated {}", report.path)
    };
    Ok(StepOutcome::new(message).with_data(&report))
}

fn symlink_shared(ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
    let release = ctx.release()?;
    let linked = SharedLinker::new(ctx.executor, &ctx.config.layout)
        .link(release, &ctx.config.shared_links)?;

    Ok(StepOutcome::new(format!("linked {} shared paths", linked.len())).with_data(&linked))
}

/// Prune tags against the history the cleanup phase saw, before it removed
/// any directories. Without a snapshot the host is listed fresh.
fn tag_cleanup(ctx: &mut HostContext<'_>) -> Result<StepOutcome> {
    let history = match ctx.history.clone() {
        Some(history) => history,
        None => ReleaseStore::new(ctx.executor, &ctx.config.layout).history()?,
    };

    let report = TagManager::new(ctx.executor, &ctx.config.layout.repository_cache)
        .prune_tags(&history, ctx.config.keep_releases);

    if let Some(failure) = report.failures.first() {
        let tags: Vec<&str> = report.failures.iter().map(|f| f.tag.as_str()).collect();
        return Err(Error::git_command_failed(format!(
            "Could not delete release tags {}: {}",
            tags.join(", "),
            failure.error
        )));
    }

    Ok(StepOutcome::new(report.message()).with_data(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{from_json_str, DeployConfig};
    use crate::release::Release;
    use crate::testing::MockExecutor;

    fn config() -> DeployConfig {
        from_json_str(
            r#"{"application": "site", "deployTo": "/srv/app", "keepReleases": 2}"#,
            "test",
        )
        .unwrap()
    }

    fn with_release(ctx: &mut HostContext<'_>) {
        ctx.release = Some(Release {
            identifier: "20240101000000".to_string(),
            revision: Some("abc123".to_string()),
            path: "/srv/app/releases/20240101000000".to_string(),
        });
    }

    fn attribution() -> Attribution {
        Attribution::new("Jane Doe", "jane@example.com")
    }

    #[test]
    fn init_settings_uses_release_template_and_shared_copy() {
        let executor = MockExecutor::new("web1").fail_on("^test -e ", 1, "");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);
        with_release(&mut ctx);

        run_hook(HookId::InitSettings, &mut ctx, &attribution()).unwrap();
        assert!(executor.ran(
            "^cp /srv/app/releases/20240101000000/sites/default/default.settings.php /srv/app/shared/settings.php$"
        ));
    }

    #[test]
    fn backup_runs_against_release_and_writes_to_shared() {
        let executor = MockExecutor::new("web1");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);
        with_release(&mut ctx);

        let outcome = run_hook(HookId::BackupDb, &mut ctx, &attribution()).unwrap();
        assert!(outcome.message.starts_with("/srv/app/shared/backups/"));
        assert!(executor.ran(
            "^drush -r /srv/app/releases/20240101000000 sql-dump --gzip --result-file=/srv/app/shared/backups/"
        ));
    }

    #[test]
    fn createdb_stops_at_first_failure() {
        let executor =
            MockExecutor::new("web1").fail_on("^mysqladmin ", 1, "database exists");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);

        assert!(run_hook(HookId::Createdb, &mut ctx, &attribution()).is_err());
        assert!(!executor.ran("^mysql "));
    }

    #[test]
    fn tag_cleanup_prefers_precleanup_snapshot() {
        let executor = MockExecutor::new("web1").respond("^ls -1 ", "r3\n");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);
        ctx.history = Some(crate::release::history_of(&["r1", "r2", "r3"]));

        run_hook(HookId::TagCleanup, &mut ctx, &attribution()).unwrap();
        assert!(!executor.ran("^ls "));
        assert!(executor.ran("git tag -d release_r1$"));
        assert!(!executor.ran("release_r2"));
    }

    #[test]
    fn tag_cleanup_fails_only_on_hard_errors() {
        let executor = MockExecutor::new("web1")
            .fail_on("tag -d release_r1$", 1, "error: tag 'release_r1' not found.")
            .fail_on("refs/tags/release_r1$", 1, "remote ref does not exist");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);
        ctx.history = Some(crate::release::history_of(&["r1", "r2", "r3"]));
        assert!(run_hook(HookId::TagCleanup, &mut ctx, &attribution()).is_ok());

        let executor = MockExecutor::new("web1").fail_on("refs/tags/release_r1$", 128, "fatal: unreachable");
        let mut ctx = HostContext::new(&executor, &config);
        ctx.history = Some(crate::release::history_of(&["r1", "r2", "r3"]));
        let err = run_hook(HookId::TagCleanup, &mut ctx, &attribution()).unwrap_err();
        assert!(err.message.contains("release_r1"));
    }

    #[test]
    fn tag_cleanup_fails_when_origin_repository_is_gone() {
        let executor = MockExecutor::new("web1").fail_on(
            "refs/tags/release_r1$",
            128,
            "fatal: repository 'https://example.com/site.git/' not found",
        );
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);
        ctx.history = Some(crate::release::history_of(&["r1", "r2", "r3"]));

        let err = run_hook(HookId::TagCleanup, &mut ctx, &attribution()).unwrap_err();
        assert!(err.message.contains("release_r1"));
    }

    #[test]
    fn tag_push_needs_a_release() {
        let executor = MockExecutor::new("web1");
        let config = config();
        let mut ctx = HostContext::new(&executor, &config);

        assert!(run_hook(HookId::TagPush, &mut ctx, &attribution()).is_err());
        assert!(executor.calls().is_empty());
    }
}
