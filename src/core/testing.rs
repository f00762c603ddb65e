//! Scriptable [`RemoteExecutor`] for exercising pipelines without a network.
//!
//! Rules are regular expressions matched against the rendered shell line of
//! each command; the first matching rule decides the output, anything else
//! succeeds with empty output. Every command is recorded in order.
//!
//! ```ignore
//! let executor = MockExecutor::new("web1")
//!     .respond("^ls -1 ", "20240101000000\n20240102000000\n")
//!     .fail_on("^ln ", 1, "ln: Permission denied");
//! ```

use regex::Regex;
use std::sync::Mutex;

use crate::remote::{CommandOutput, RemoteCommand, RemoteExecutor};

struct MockRule {
    pattern: Regex,
    output: CommandOutput,
}

pub struct MockExecutor {
    host: String,
    rules: Vec<MockRule>,
    calls: Mutex<Vec<RemoteCommand>>,
}

impl MockExecutor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer commands matching `pattern` with `stdout` and exit code 0.
    ///
    /// Panics on an invalid pattern; rules are written by tests.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.rule(pattern, CommandOutput::ok(stdout))
    }

    /// Fail commands matching `pattern` with `exit_code` and `stderr`.
    pub fn fail_on(self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.rule(pattern, CommandOutput::failed(exit_code, stderr))
    }

    fn rule(mut self, pattern: &str, output: CommandOutput) -> Self {
        let pattern = Regex::new(pattern).unwrap_or_else(|e| panic!("bad mock pattern: {}", e));
        self.rules.push(MockRule { pattern, output });
        self
    }

    /// Recorded commands rendered as shell lines.
    pub fn calls(&self) -> Vec<String> {
        self.commands().iter().map(RemoteCommand::to_shell).collect()
    }

    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Index of the first recorded call matching `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        let pattern = Regex::new(pattern).ok()?;
        self.calls().iter().position(|c| pattern.is_match(c))
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }
}

impl RemoteExecutor for MockExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    fn run(&self, command: &RemoteCommand) -> CommandOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let line = command.to_shell();
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(&line))
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}
