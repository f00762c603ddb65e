use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::{join_remote, ReleaseLayout};
use crate::shared::SharedLink;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "deckhand.json";

/// SSH target for one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
}

/// On-disk form of `deckhand.json`. Paths and credentials left out are
/// derived from `application` and `stage` by [`RawConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub application: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_stage")]
    pub stage: String,

    #[serde(default)]
    pub deploy_to: Option<String>,

    #[serde(default)]
    pub release_path: Option<String>,

    #[serde(default)]
    pub shared_path: Option<String>,

    #[serde(default = "default_repository_cache")]
    pub repository_cache: String,

    #[serde(default = "default_true")]
    pub git_enable_submodules: bool,

    #[serde(default = "default_shared_children")]
    pub shared_children: Vec<String>,

    #[serde(default = "default_shared_links")]
    pub shared_links: Vec<SharedLink>,

    #[serde(default = "default_settings_template")]
    pub settings_template: String,

    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    #[serde(default)]
    pub db_name: Option<String>,

    #[serde(default)]
    pub db_username: Option<String>,

    #[serde(default)]
    pub db_password: Option<String>,

    #[serde(default)]
    pub salt: String,

    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default = "default_runner_group")]
    pub runner_group: String,

    #[serde(default)]
    pub use_sudo: bool,

    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCredentials {
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Fully resolved deploy configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub application: String,
    pub repository: Option<String>,
    pub branch: String,
    pub stage: String,
    pub layout: ReleaseLayout,
    pub git_enable_submodules: bool,
    pub shared_children: Vec<String>,
    pub shared_links: Vec<SharedLink>,
    /// Default settings template, relative to a release root.
    pub settings_template: String,
    /// Settings file path under the shared directory.
    pub settings_path: String,
    pub db: DbCredentials,
    pub keep_releases: usize,
    pub runner_group: String,
    pub use_sudo: bool,
    pub servers: Vec<Server>,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_port() -> u16 {
    22
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_stage() -> String {
    "prod".to_string()
}

fn default_repository_cache() -> String {
    "git-cache".to_string()
}

fn default_true() -> bool {
    true
}

fn default_shared_children() -> Vec<String> {
    vec![
        "files".to_string(),
        "private".to_string(),
        "backups".to_string(),
    ]
}

fn default_shared_links() -> Vec<SharedLink> {
    vec![
        SharedLink::new("files", "sites/default/files"),
        SharedLink::new("private", "sites/default/private"),
        SharedLink::new("settings.php", "sites/default/settings.php"),
    ]
}

fn default_settings_template() -> String {
    "sites/default/default.settings.php".to_string()
}

fn default_settings_file() -> String {
    "settings.php".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_runner_group() -> String {
    "www-data".to_string()
}

/// Password derived from a secret salt, the stage, and the application name.
pub fn derive_db_password(salt: &str, stage: &str, application: &str) -> String {
    let digest = Sha256::digest(format!("{}{}{}", salt, stage, application).as_bytes());
    format!("{:x}", digest)
}

// =============================================================================
// Loading functions
// =============================================================================

impl RawConfig {
    pub fn resolve(self) -> Result<DeployConfig> {
        let application = self
            .application
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| Error::config_missing_key("application", None))?;

        for link in &self.shared_links {
            validate_relative("sharedLinks", &link.name)?;
            validate_relative("sharedLinks", link.target())?;
        }
        for child in &self.shared_children {
            validate_relative("sharedChildren", child)?;
        }
        validate_relative("settingsFile", &self.settings_file)?;

        let deploy_to = self
            .deploy_to
            .unwrap_or_else(|| format!("/var/www/{}", application));
        let layout = ReleaseLayout::new(
            &deploy_to,
            self.release_path.as_deref(),
            self.shared_path.as_deref(),
            &self.repository_cache,
        );

        let default_db = format!("{}_{}", self.stage, application);
        let db = DbCredentials {
            name: self.db_name.unwrap_or_else(|| default_db.clone()),
            username: self.db_username.unwrap_or(default_db),
            password: self
                .db_password
                .unwrap_or_else(|| derive_db_password(&self.salt, &self.stage, &application)),
        };

        let settings_path = join_remote(&layout.shared, &self.settings_file);

        Ok(DeployConfig {
            application,
            repository: self.repository,
            branch: self.branch,
            stage: self.stage,
            layout,
            git_enable_submodules: self.git_enable_submodules,
            shared_children: self.shared_children,
            shared_links: self.shared_links,
            settings_template: self.settings_template,
            settings_path,
            db,
            keep_releases: self.keep_releases,
            runner_group: self.runner_group,
            use_sudo: self.use_sudo,
            servers: self.servers,
        })
    }
}

fn validate_relative(key: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.split('/').any(|p| p == "..") {
        return Err(Error::config_invalid_value(
            key,
            Some(value.to_string()),
            "must be a non-empty relative path without '..'",
        ));
    }
    Ok(())
}

/// Parse and resolve a config from JSON text. `source` names it in errors.
pub fn from_json_str(content: &str, source: &str) -> Result<DeployConfig> {
    let raw: RawConfig =
        serde_json::from_str(content).map_err(|e| Error::config_invalid_json(source, e))?;
    raw.resolve()
}

/// Load and resolve a config file.
pub fn load(path: &Path) -> Result<DeployConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    from_json_str(&content, &path.display().to_string())
}

impl DeployConfig {
    /// Default settings template inside a given release directory.
    pub fn settings_template_in(&self, release_path: &str) -> String {
        join_remote(release_path, &self.settings_template)
    }

    /// Directories created at setup: deploy root, releases, shared, shared children.
    pub fn setup_dirs(&self) -> Vec<String> {
        let mut dirs = vec![
            self.layout.deploy_to.clone(),
            self.layout.releases.clone(),
            self.layout.shared.clone(),
        ];
        dirs.extend(
            self.shared_children
                .iter()
                .map(|child| self.layout.shared_child(child)),
        );
        dirs
    }
}
