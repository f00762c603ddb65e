//! Remote command seam.
//!
//! Every effect on a target host goes through [`RemoteExecutor::run`] as a
//! structured [`RemoteCommand`]: a program plus an argument vector. Values are
//! never interpolated into command text; quoting happens once, when a
//! transport needs a shell string.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::utils::shell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub sudo: bool,
    #[serde(skip)]
    pub stdin: Option<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            sudo: false,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir` on the target host.
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Prefix the command with `sudo` when `enabled`.
    pub fn sudo(mut self, enabled: bool) -> Self {
        self.sudo = enabled;
        self
    }

    /// Feed `content` to the command's standard input.
    pub fn with_stdin(mut self, content: impl Into<String>) -> Self {
        self.stdin = Some(content.into());
        self
    }

    /// Full argument vector including the privilege prefix.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if self.sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Render as a single shell command line, every argument quoted.
    pub fn to_shell(&self) -> String {
        let command = shell::quote_args(&self.argv());
        match &self.cwd {
            Some(dir) => format!("cd {} && {}", shell::quote_path(dir), command),
            None => command,
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Transport that runs a command on one target host and waits for it to exit.
pub trait RemoteExecutor: Send + Sync {
    fn host(&self) -> &str;
    fn run(&self, command: &RemoteCommand) -> CommandOutput;
}

/// Run a command and turn a non-zero exit into `remote.command_failed`.
pub fn run_checked(executor: &dyn RemoteExecutor, command: &RemoteCommand) -> Result<CommandOutput> {
    let output = executor.run(command);
    if output.success {
        return Ok(output);
    }

    Err(command_failed(executor, command, output))
}

/// Build the `remote.command_failed` error for an output already in hand.
pub fn command_failed(
    executor: &dyn RemoteExecutor,
    command: &RemoteCommand,
    output: CommandOutput,
) -> Error {
    Error::remote_command_failed(RemoteCommandFailedDetails {
        command: command.to_shell(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        host: executor.host().to_string(),
    })
}
