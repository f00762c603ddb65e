use serde::Serialize;
use serde_json::Value;

use crate::ssh::is_connection_failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    SshIdentityFileNotFound,
    RemoteCommandFailed,
    GitCommandFailed,

    DeployStepFailed,
    DeployHalted,
    ReleaseDuplicate,
    HookGraphInvalid,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::DeployStepFailed => "deploy.step_failed",
            ErrorCode::DeployHalted => "deploy.halted",
            ErrorCode::ReleaseDuplicate => "release.duplicate",
            ErrorCode::HookGraphInvalid => "hooks.graph_invalid",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

/// What ran, where, and what it printed. Attached to every failed remote command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployStepFailedDetails {
    step: String,
    host: String,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidArgumentDetails {
    field: String,
    problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigValueDetails {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InternalDetails {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

fn details<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    // --- Remote execution ---

    /// A command exited non-zero on a host. Only failures where ssh never
    /// started the command are marked retryable.
    pub fn remote_command_failed(failure: RemoteCommandFailedDetails) -> Self {
        let stderr = failure.stderr.trim();
        let message = if stderr.is_empty() {
            format!("Remote command failed on {}: {}", failure.host, failure.command)
        } else {
            format!(
                "Remote command failed on {}: {}: {}",
                failure.host, failure.command, stderr
            )
        };

        let retryable = is_connection_failure(failure.exit_code, &failure.stdout, &failure.stderr);
        let mut err = Self::new(ErrorCode::RemoteCommandFailed, message, details(&failure));
        err.retryable = Some(retryable);
        err
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let identity_file = identity_file.into();
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            format!("SSH identity file not found: {}", identity_file),
            serde_json::json!({ "host": host.into(), "identityFile": identity_file }),
        )
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    // --- Deploy orchestration ---

    pub fn deploy_step_failed(
        step: impl Into<String>,
        host: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let failure = DeployStepFailedDetails {
            step: step.into(),
            host: host.into(),
            error: error.into(),
        };
        Self::new(
            ErrorCode::DeployStepFailed,
            format!("Step '{}' failed on {}", failure.step, failure.host),
            details(&failure),
        )
    }

    pub fn deploy_halted(hosts: Vec<String>) -> Self {
        Self::new(
            ErrorCode::DeployHalted,
            format!("Deploy aborted on {}", hosts.join(", ")),
            serde_json::json!({ "hosts": hosts }),
        )
        .with_hint("Completed steps are not rolled back; fix the failure and re-run the deploy")
    }

    pub fn release_duplicate(identifier: impl Into<String>, host: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let host = host.into();
        Self::new(
            ErrorCode::ReleaseDuplicate,
            format!("Release '{}' already exists on {}", identifier, host),
            serde_json::json!({ "identifier": identifier, "host": host }),
        )
    }

    pub fn hook_graph_invalid(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::HookGraphInvalid,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    // --- Configuration and arguments ---

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            serde_json::json!({ "key": key, "path": path }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details(InternalDetails {
                error: err.to_string(),
                context: Some(path.into()),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            details(ConfigValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let field = field.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid {}: {}", field, problem),
            details(InvalidArgumentDetails {
                field,
                problem,
                id,
                tried,
            }),
        )
    }

    // --- Internal ---

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            details(InternalDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            details(InternalDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }
}
