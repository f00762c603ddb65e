//! Commands run on the operator's machine, never on a target host.

use std::process::Command;

/// Run a command, returning None on failure or empty output instead of error.
///
/// Useful when command failure is expected/acceptable (e.g., unset git config keys).
pub fn run_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

/// Value of a key in the operator's git config, if set.
pub fn git_config(key: &str) -> Option<String> {
    run_optional("git", &["config", "--get", key])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_optional_returns_trimmed_stdout() {
        assert_eq!(run_optional("echo", &["  hello "]).as_deref(), Some("hello"));
    }

    #[test]
    fn run_optional_returns_none_on_failure() {
        assert!(run_optional("false", &[]).is_none());
        assert!(run_optional("nonexistent_command_xyz", &[]).is_none());
    }

    #[test]
    fn run_optional_returns_none_on_empty_output() {
        assert!(run_optional("true", &[]).is_none());
    }

    #[test]
    fn unset_git_config_key_is_none() {
        assert!(git_config("deckhand.no-such-key").is_none());
    }
}
