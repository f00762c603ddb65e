//! Source-control checkout into a release directory.
//!
//! The shipped strategy keeps a clone in the shared directory, refreshes it
//! on every deploy, and copies it into the new release. Only the repository
//! cache ever talks to the origin.

use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::remote::{command_failed, run_checked, RemoteCommand, RemoteExecutor};

/// Populates a release directory and reports the revision it holds.
pub trait Checkout: Send + Sync {
    fn checkout(&self, executor: &dyn RemoteExecutor, release_path: &str) -> Result<String>;
}

/// Clone-once, fetch-every-time checkout via a cached repository on the host.
#[derive(Debug, Clone)]
pub struct GitRemoteCache {
    pub repository: String,
    pub branch: String,
    pub cache_path: String,
    pub submodules: bool,
}

impl GitRemoteCache {
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let repository = config
            .repository
            .clone()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| Error::config_missing_key("repository", None))?;

        Ok(Self {
            repository,
            branch: config.branch.clone(),
            cache_path: config.layout.repository_cache.clone(),
            submodules: config.git_enable_submodules,
        })
    }

    fn git(&self) -> RemoteCommand {
        RemoteCommand::new("git").in_dir(&self.cache_path)
    }

    fn cache_exists(&self, executor: &dyn RemoteExecutor) -> Result<bool> {
        let cmd = RemoteCommand::new("test").args(["-d", format!("{}/.git", self.cache_path).as_str()]);
        let output = executor.run(&cmd);
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(command_failed(executor, &cmd, output)),
        }
    }

    /// Bring the repository cache to the tip of the configured branch.
    fn refresh_cache(&self, executor: &dyn RemoteExecutor) -> Result<()> {
        if self.cache_exists(executor)? {
            log_status!("checkout", "Updating repository cache at {}", self.cache_path);
            let origin_branch = format!("origin/{}", self.branch);
            for args in [
                vec!["fetch", "-q", "origin"],
                vec!["fetch", "--tags", "-q", "origin"],
                vec!["reset", "-q", "--hard", origin_branch.as_str()],
                vec!["clean", "-q", "-d", "-x", "-f"],
            ] {
                run_checked(executor, &self.git().args(args))?;
            }
        } else {
            log_status!("checkout", "Cloning {} into {}", self.repository, self.cache_path);
            run_checked(
                executor,
                &RemoteCommand::new("git").args([
                    "clone",
                    "-q",
                    "--branch",
                    self.branch.as_str(),
                    self.repository.as_str(),
                    self.cache_path.as_str(),
                ]),
            )?;
        }

        if self.submodules {
            run_checked(executor, &self.git().args(["submodule", "-q", "sync"]))?;
            run_checked(
                executor,
                &self
                    .git()
                    .args(["submodule", "-q", "update", "--init", "--recursive"]),
            )?;
        }

        Ok(())
    }
}

impl Checkout for GitRemoteCache {
    fn checkout(&self, executor: &dyn RemoteExecutor, release_path: &str) -> Result<String> {
        self.refresh_cache(executor)?;

        let output = run_checked(executor, &self.git().args(["rev-parse", "HEAD"]))?;
        let revision = output.stdout.trim().to_string();
        if revision.is_empty() {
            return Err(Error::git_command_failed(format!(
                "Could not resolve HEAD of {} on {}",
                self.cache_path,
                executor.host()
            )));
        }

        run_checked(
            executor,
            &RemoteCommand::new("cp").args(["-RPp", self.cache_path.as_str(), release_path]),
        )?;

        Ok(revision)
    }
}
