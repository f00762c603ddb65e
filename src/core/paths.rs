//! Remote directory layout for the releases deployment model.
//!
//! ```text
//! <deploy_to>/
//!   releases/<identifier>/   one directory per release
//!   shared/                  persists across releases
//!     git-cache/             repository cache
//!   current -> releases/<identifier>
//! ```

use serde::Serialize;

/// Join a relative child onto a remote base path. Absolute children win.
pub fn join_remote(base: &str, child: &str) -> String {
    let child = child.trim();
    if child.starts_with('/') {
        return child.to_string();
    }
    let child = child.trim_start_matches("./");

    if base.ends_with('/') {
        format!("{}{}", base, child)
    } else {
        format!("{}/{}", base, child)
    }
}

/// Parent directory of a remote path, if it has one.
pub fn parent_remote(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseLayout {
    pub deploy_to: String,
    pub releases: String,
    pub shared: String,
    pub current: String,
    pub repository_cache: String,
}

impl ReleaseLayout {
    pub fn new(
        deploy_to: &str,
        releases: Option<&str>,
        shared: Option<&str>,
        repository_cache: &str,
    ) -> Self {
        let deploy_to = deploy_to.trim_end_matches('/').to_string();
        let releases = releases
            .map(|p| join_remote(&deploy_to, p))
            .unwrap_or_else(|| join_remote(&deploy_to, "releases"));
        let shared = shared
            .map(|p| join_remote(&deploy_to, p))
            .unwrap_or_else(|| join_remote(&deploy_to, "shared"));
        let repository_cache = join_remote(&shared, repository_cache);
        let current = join_remote(&deploy_to, "current");

        Self {
            deploy_to,
            releases,
            shared,
            current,
            repository_cache,
        }
    }

    pub fn release_dir(&self, identifier: &str) -> String {
        join_remote(&self.releases, identifier)
    }

    pub fn shared_child(&self, name: &str) -> String {
        join_remote(&self.shared, name)
    }
}
