use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::paths::{join_remote, ReleaseLayout};
use crate::remote::{command_failed, run_checked, RemoteCommand, RemoteExecutor};

use super::{Release, ReleaseHistory};

/// File inside each release directory holding the deployed revision.
pub const REVISION_FILE: &str = "REVISION";

/// View over the releases directory of one host.
///
/// Holds no state of its own: every call re-lists the host, so releases
/// added or removed by someone else between calls are picked up.
pub struct ReleaseStore<'a> {
    executor: &'a dyn RemoteExecutor,
    layout: &'a ReleaseLayout,
}

impl<'a> ReleaseStore<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, layout: &'a ReleaseLayout) -> Self {
        Self { executor, layout }
    }

    /// Releases currently present on the host, oldest first.
    pub fn history(&self) -> Result<ReleaseHistory> {
        let identifiers = self.list_identifiers()?;
        let revisions = self.read_revisions(&identifiers);

        let releases = identifiers
            .into_iter()
            .map(|identifier| Release {
                revision: revisions.get(&identifier).cloned(),
                path: self.layout.release_dir(&identifier),
                identifier,
            })
            .collect();

        Ok(ReleaseHistory::new(releases))
    }

    /// The `n` most recently created releases, oldest first.
    pub fn last_n(&self, n: usize) -> Result<Vec<Release>> {
        Ok(self.history()?.last_n(n).to_vec())
    }

    /// Fail with `release.duplicate` when `identifier` is already on the host.
    pub fn ensure_absent(&self, identifier: &str) -> Result<()> {
        if self.list_identifiers()?.iter().any(|id| id == identifier) {
            return Err(Error::release_duplicate(identifier, self.executor.host()));
        }
        Ok(())
    }

    /// Record a checked-out release by writing its revision marker.
    pub fn record_release(&self, identifier: &str, revision: &str) -> Result<Release> {
        let path = self.layout.release_dir(identifier);
        let marker = join_remote(&path, REVISION_FILE);

        let cmd = RemoteCommand::new("tee")
            .arg(&marker)
            .with_stdin(format!("{}\n", revision));
        run_checked(self.executor, &cmd)?;

        log_status!("releases", "Recorded release {} at {}", identifier, revision);

        Ok(Release {
            identifier: identifier.to_string(),
            revision: Some(revision.to_string()),
            path,
        })
    }

    fn list_identifiers(&self) -> Result<Vec<String>> {
        let cmd = RemoteCommand::new("ls").args(["-1", self.layout.releases.as_str()]);
        let output = self.executor.run(&cmd);

        if !output.success {
            // Not set up yet: no releases directory means no releases.
            if output.stderr.contains("No such file or directory") {
                return Ok(Vec::new());
            }
            return Err(command_failed(self.executor, &cmd, output));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('.'))
            .map(String::from)
            .collect())
    }

    /// Best effort: releases without a readable marker get no revision.
    fn read_revisions(&self, identifiers: &[String]) -> HashMap<String, String> {
        if identifiers.is_empty() {
            return HashMap::new();
        }

        let markers: Vec<String> = identifiers
            .iter()
            .map(|id| join_remote(&self.layout.release_dir(id), REVISION_FILE))
            .collect();
        let cmd = RemoteCommand::new("grep").args(["-H", "."]).args(markers.iter());
        let output = self.executor.run(&cmd);

        let mut revisions = HashMap::new();
        for line in output.stdout.lines() {
            let Some((file, revision)) = line.split_once(':') else {
                continue;
            };
            if let Some(id) = identifiers
                .iter()
                .zip(markers.iter())
                .find(|(_, marker)| marker.as_str() == file)
                .map(|(id, _)| id)
            {
                revisions
                    .entry(id.clone())
                    .or_insert_with(|| revision.trim().to_string());
            }
        }
        revisions
    }
}
