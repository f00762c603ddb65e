//! Releases and their on-host history.
//!
//! - `store` - Discovers and records releases on a target host

pub mod store;

use serde::Serialize;

pub use store::ReleaseStore;

/// Release identifier format: UTC timestamp, sorts chronologically as a string.
pub const IDENTIFIER_FORMAT: &str = "%Y%m%d%H%M%S";

/// One versioned deployment of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub path: String,
}

impl Release {
    /// Name of the source-control tag marking this release.
    pub fn tag_name(&self) -> String {
        tag_name(&self.identifier)
    }
}

pub fn tag_name(identifier: &str) -> String {
    format!("release_{}", identifier)
}

/// Generate a fresh release identifier from the current UTC time.
pub fn new_identifier() -> String {
    chrono::Utc::now().format(IDENTIFIER_FORMAT).to_string()
}

/// Releases present on a host, oldest first, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReleaseHistory {
    releases: Vec<Release>,
}

impl ReleaseHistory {
    pub fn new(mut releases: Vec<Release>) -> Self {
        releases.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        releases.dedup_by(|a, b| a.identifier == b.identifier);
        Self { releases }
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Release> {
        self.releases.iter()
    }

    pub fn as_slice(&self) -> &[Release] {
        &self.releases
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.releases.iter().any(|r| r.identifier == identifier)
    }

    pub fn latest(&self) -> Option<&Release> {
        self.releases.last()
    }

    /// The `n` most recently created releases, oldest first.
    pub fn last_n(&self, n: usize) -> &[Release] {
        let start = self.releases.len().saturating_sub(n);
        &self.releases[start..]
    }

    /// Every release older than the `keep` most recent ones.
    pub fn older_than_last(&self, keep: usize) -> &[Release] {
        let end = self.releases.len().saturating_sub(keep);
        &self.releases[..end]
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.releases.iter().map(|r| r.identifier.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a ReleaseHistory {
    type Item = &'a Release;
    type IntoIter = std::slice::Iter<'a, Release>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.iter()
    }
}

#[cfg(test)]
pub(crate) fn history_of(ids: &[&str]) -> ReleaseHistory {
    ReleaseHistory::new(
        ids.iter()
            .map(|id| Release {
                identifier: id.to_string(),
                revision: None,
                path: format!("/srv/app/releases/{}", id),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_sorted_and_deduplicated() {
        let history = history_of(&["20240103000000", "20240101000000", "20240103000000"]);
        assert_eq!(
            history.identifiers(),
            vec!["20240101000000".to_string(), "20240103000000".to_string()]
        );
    }

    #[test]
    fn last_n_returns_most_recent_oldest_first() {
        let history = history_of(&["r1", "r2", "r3", "r4"]);
        let ids: Vec<_> = history.last_n(2).iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r4"]);
        assert_eq!(history.last_n(10).len(), 4);
        assert!(history.last_n(0).is_empty());
    }

    #[test]
    fn older_than_last_is_complement_of_last_n() {
        let history = history_of(&["r1", "r2", "r3", "r4", "r5", "r6"]);
        let ids: Vec<_> = history
            .older_than_last(5)
            .iter()
            .map(|r| r.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["r1"]);
        assert!(history.older_than_last(6).is_empty());
        assert_eq!(history.older_than_last(0).len(), 6);
    }

    #[test]
    fn tag_name_prefixes_identifier() {
        assert_eq!(tag_name("20240101120000"), "release_20240101120000");
    }

    #[test]
    fn new_identifier_is_fourteen_digits() {
        let id = new_identifier();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }
}
