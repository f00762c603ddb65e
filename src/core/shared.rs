//! Shared resource linking.
//!
//! A shared path lives under the persistent shared directory and is linked
//! into every new release. Linking is remove-then-link: whatever occupies
//! the target inside the release is deleted (never merged) before the
//! symlink is created, so re-running it converges on the same links.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths::{join_remote, parent_remote, ReleaseLayout};
use crate::release::Release;
use crate::remote::{run_checked, RemoteCommand, RemoteExecutor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedLink {
    /// Name of the entry under the shared directory.
    pub name: String,
    /// Location inside the release, relative to its root. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl SharedLink {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: Some(target.into()),
        }
    }

    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPath {
    pub name: String,
    pub source: String,
    pub target: String,
}

pub struct SharedLinker<'a> {
    executor: &'a dyn RemoteExecutor,
    layout: &'a ReleaseLayout,
}

impl<'a> SharedLinker<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, layout: &'a ReleaseLayout) -> Self {
        Self { executor, layout }
    }

    /// Link every shared path into `release`, in order.
    ///
    /// Each path is linked independently; the first failure stops the
    /// remaining links and is returned. Links made before it stay in place.
    pub fn link(&self, release: &Release, links: &[SharedLink]) -> Result<Vec<LinkedPath>> {
        let mut linked = Vec::with_capacity(links.len());

        for link in links {
            let source = self.layout.shared_child(&link.name);
            let target = join_remote(&release.path, link.target());

            log_status!("shared", "Linking {} -> {}", target, source);

            if let Some(parent) = parent_remote(&target) {
                run_checked(
                    self.executor,
                    &RemoteCommand::new("mkdir").args(["-p", parent]),
                )?;
            }
            run_checked(
                self.executor,
                &RemoteCommand::new("rm").args(["-rf", target.as_str()]),
            )?;
            run_checked(
                self.executor,
                &RemoteCommand::new("ln").args(["-nfs", source.as_str(), target.as_str()]),
            )?;

            linked.push(LinkedPath {
                name: link.name.clone(),
                source,
                target,
            });
        }

        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;

    fn release() -> Release {
        Release {
            identifier: "20240101000000".to_string(),
            revision: Some("abc123".to_string()),
            path: "/srv/app/releases/20240101000000".to_string(),
        }
    }

    fn links() -> Vec<SharedLink> {
        vec![
            SharedLink::new("files", "sites/default/files"),
            SharedLink::new("settings.php", "sites/default/settings.php"),
        ]
    }

    #[test]
    fn link_removes_then_links_each_path_in_order() {
        let executor = MockExecutor::new("web1");
        let layout = ReleaseLayout::new("/srv/app", None, None, "git-cache");
        let linker = SharedLinker::new(&executor, &layout);

        let linked = linker.link(&release(), &links()).unwrap();
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].source, "/srv/app/shared/files");
        assert_eq!(
            linked[0].target,
            "/srv/app/releases/20240101000000/sites/default/files"
        );

        assert_eq!(
            executor.calls(),
            vec![
                "mkdir -p /srv/app/releases/20240101000000/sites/default",
                "rm -rf /srv/app/releases/20240101000000/sites/default/files",
                "ln -nfs /srv/app/shared/files /srv/app/releases/20240101000000/sites/default/files",
                "mkdir -p /srv/app/releases/20240101000000/sites/default",
                "rm -rf /srv/app/releases/20240101000000/sites/default/settings.php",
                "ln -nfs /srv/app/shared/settings.php /srv/app/releases/20240101000000/sites/default/settings.php",
            ]
        );
    }

    #[test]
    fn link_stops_at_first_failure() {
        let executor =
            MockExecutor::new("web1").fail_on("^ln -nfs /srv/app/shared/files ", 1, "Permission denied");
        let layout = ReleaseLayout::new("/srv/app", None, None, "git-cache");
        let linker = SharedLinker::new(&executor, &layout);

        let err = linker.link(&release(), &links()).unwrap_err();
        assert!(err.message.contains("Permission denied"));
        assert!(!executor.ran("settings\\.php"));
    }

    #[test]
    fn link_target_defaults_to_name() {
        let link: SharedLink = serde_json::from_str(r#"{"name": "private"}"#).unwrap();
        assert_eq!(link.target(), "private");
    }
}
