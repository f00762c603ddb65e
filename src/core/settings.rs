//! Settings file provisioning.
//!
//! The settings file lives in the shared directory. It is seeded from the
//! release's default template only when absent, then placeholder tokens are
//! substituted in place on every deploy. Operator edits outside the
//! placeholders survive redeploys.

use serde::Serialize;

use crate::config::DbCredentials;
use crate::error::Result;
use crate::remote::{command_failed, run_checked, RemoteCommand, RemoteExecutor};
use crate::utils::shell;

/// Owner and group read/write, others read-only.
pub const SETTINGS_MODE: &str = "664";

/// A placeholder token and the value replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    pub token: String,
    #[serde(skip)]
    pub value: String,
}

impl Substitution {
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
        }
    }

    /// sed expression replacing every occurrence of the token, single pass.
    pub fn sed_expression(&self) -> String {
        format!(
            "s/{}/{}/g",
            shell::escape_sed_pattern(&self.token),
            shell::escape_sed_replacement(&self.value)
        )
    }
}

/// Database substitutions in their fixed order: `%db`, `%user`, `%password`.
pub fn database_substitutions(db: &DbCredentials) -> Vec<Substitution> {
    vec![
        Substitution::new("%db", &db.name),
        Substitution::new("%user", &db.username),
        Substitution::new("%password", &db.password),
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsReport {
    pub path: String,
    pub initialized: bool,
    pub substituted: Vec<String>,
}

pub struct SettingsProvisioner<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> SettingsProvisioner<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    pub fn ensure_settings_file(
        &self,
        template: &str,
        shared_settings: &str,
        substitutions: &[Substitution],
    ) -> Result<SettingsReport> {
        let initialized = !self.exists(shared_settings)?;
        if initialized {
            log_status!("settings", "Seeding {} from {}", shared_settings, template);
            run_checked(
                self.executor,
                &RemoteCommand::new("cp").args([template, shared_settings]),
            )?;
        }

        run_checked(
            self.executor,
            &RemoteCommand::new("chmod").args([SETTINGS_MODE, shared_settings]),
        )?;

        // One sed invocation per token keeps the order fixed and each pass single.
        for substitution in substitutions {
            run_checked(
                self.executor,
                &RemoteCommand::new("sed").args([
                    "-i",
                    "-e",
                    substitution.sed_expression().as_str(),
                    shared_settings,
                ]),
            )?;
        }

        Ok(SettingsReport {
            path: shared_settings.to_string(),
            initialized,
            substituted: substitutions.iter().map(|s| s.token.clone()).collect(),
        })
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let cmd = RemoteCommand::new("test").args(["-e", path]);
        let output = self.executor.run(&cmd);
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(command_failed(self.executor, &cmd, output)),
        }
    }
}
