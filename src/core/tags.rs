//! Release tags on the shared origin.
//!
//! Every completed release is tagged `release_<identifier>` in the host's
//! repository cache and pushed to `origin`. Cleanup keeps the tags of the
//! `keep` most recent releases (by release creation order) and deletes the
//! rest, oldest first.

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::release::{Release, ReleaseHistory};
use crate::remote::{run_checked, RemoteCommand, RemoteExecutor};
use crate::utils::command;

/// Who deployed: read from the operator's local git identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub name: String,
    pub email: String,
}

impl Attribution {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Read `user.name` and `user.email` from the local git configuration.
    pub fn from_local_git() -> Self {
        Self {
            name: command::git_config("user.name").unwrap_or_default(),
            email: command::git_config("user.email").unwrap_or_default(),
        }
    }

    pub fn message(&self) -> String {
        format!("Deployed by {} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub revision: String,
    pub message: String,
}

/// Which tags a prune keeps and which it deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunePlan {
    pub keep: usize,
    pub total: usize,
    pub kept: Vec<String>,
    pub stale: Vec<String>,
}

impl PrunePlan {
    pub fn is_noop(&self) -> bool {
        self.stale.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFailure {
    pub tag: String,
    pub command: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub plan: PrunePlan,
    /// Tags whose local and remote deletions both ran without error.
    pub deleted: Vec<String>,
    /// Tags that were already absent somewhere (e.g. never pushed).
    pub missing: Vec<String>,
    pub failures: Vec<TagFailure>,
}

impl PruneReport {
    pub fn message(&self) -> String {
        if self.plan.is_noop() {
            "nothing to prune".to_string()
        } else {
            format!(
                "kept {} of {} release tags, deleted {}",
                self.plan.kept.len(),
                self.plan.total,
                self.deleted.len()
            )
        }
    }
}

/// Compute the stale tags for `history` under a retention of `keep`.
pub fn plan_prune(history: &ReleaseHistory, keep: usize) -> PrunePlan {
    PrunePlan {
        keep,
        total: history.len(),
        kept: history.last_n(keep).iter().map(Release::tag_name).collect(),
        stale: history
            .older_than_last(keep)
            .iter()
            .map(Release::tag_name)
            .collect(),
    }
}

/// Deletion failures that only mean the tag was never there: `git tag -d`
/// on an unknown tag, or a push deleting a ref origin does not have. An
/// unreachable or unknown repository is a real failure.
fn is_missing_ref(error: &str) -> bool {
    Regex::new(r"(?m)^error: tag '[^']+' not found|remote ref does not exist")
        .map(|re| re.is_match(error))
        .unwrap_or(false)
}

pub struct TagManager<'a> {
    executor: &'a dyn RemoteExecutor,
    repository_cache: &'a str,
}

impl<'a> TagManager<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, repository_cache: &'a str) -> Self {
        Self {
            executor,
            repository_cache,
        }
    }

    fn git(&self) -> RemoteCommand {
        RemoteCommand::new("git").in_dir(self.repository_cache)
    }

    /// Tag `release` at its revision and publish the tag to `origin`.
    ///
    /// Re-tagging the same identifier overwrites the tag locally and remotely.
    pub fn tag_release(&self, release: &Release, attribution: &Attribution) -> Result<Tag> {
        let revision = release.revision.clone().ok_or_else(|| {
            Error::git_command_failed(format!(
                "Release {} has no recorded revision to tag",
                release.identifier
            ))
        })?;
        let tag = Tag {
            name: release.tag_name(),
            revision,
            message: attribution.message(),
        };

        run_checked(
            self.executor,
            &self.git().args([
                "tag",
                "-f",
                tag.name.as_str(),
                tag.revision.as_str(),
                "-m",
                tag.message.as_str(),
            ]),
        )?;
        run_checked(
            self.executor,
            &self
                .git()
                .args(["push", "-f", "origin", "tag", tag.name.as_str()]),
        )?;

        log_status!("tags", "Pushed {} ({})", tag.name, tag.revision);
        Ok(tag)
    }

    /// Delete the tags of every release outside the retention window.
    ///
    /// Deletions run oldest first and never abort the loop: an already
    /// missing tag is a no-op, any other failure is recorded and the
    /// remaining tags are still attempted.
    pub fn prune_tags(&self, history: &ReleaseHistory, keep: usize) -> PruneReport {
        let plan = plan_prune(history, keep);

        if plan.is_noop() {
            log_status!("tags", "no old release tags to clean up");
        } else {
            log_status!("tags", "keeping {} of {} release tags", keep, plan.total);
        }

        let mut deleted = Vec::new();
        let mut missing = Vec::new();
        let mut failures = Vec::new();

        for tag in &plan.stale {
            let local = self.git().args(["tag", "-d", tag.as_str()]);
            let remote = self
                .git()
                .args(["push", "origin", format!(":refs/tags/{}", tag).as_str()]);

            let mut clean = true;
            for cmd in [local, remote] {
                let output = self.executor.run(&cmd);
                if output.success {
                    continue;
                }
                clean = false;
                if is_missing_ref(output.error_text()) {
                    if !missing.contains(tag) {
                        missing.push(tag.clone());
                    }
                } else {
                    failures.push(TagFailure {
                        tag: tag.clone(),
                        command: cmd.to_shell(),
                        error: output.error_text().to_string(),
                    });
                }
            }

            if clean {
                deleted.push(tag.clone());
            }
        }

        PruneReport {
            plan,
            deleted,
            missing,
            failures,
        }
    }
}
