use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::Server;
use crate::error::{Error, Result};
use crate::remote::{CommandOutput, RemoteCommand, RemoteExecutor};

/// Never prompt, never hang on a stalled connection.
const SSH_OPTIONS: [&str; 4] = [
    "BatchMode=yes",
    "ConnectTimeout=10",
    "ServerAliveInterval=15",
    "ServerAliveCountMax=3",
];

/// Seconds to wait before each retry of a dropped connection.
const RETRY_DELAYS_SECS: [u64; 2] = [2, 5];

/// ssh's own exit status for connection failures, as opposed to the remote command's.
pub const SSH_CONNECTION_EXIT: i32 = 255;

/// How ssh itself reports that it never got a session. The remote command's
/// own stderr can mention refused connections too, so only line prefixes count.
const SSH_FAILURE_PREFIXES: [&str; 6] = [
    "ssh: ",
    "kex_exchange_identification:",
    "ssh_exchange_identification:",
    "Connection closed by ",
    "Connection reset by ",
    "Connection timed out during banner exchange",
];

/// [`RemoteExecutor`] over the system `ssh` binary.
pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    /// ssh binary to invoke. `ssh` from PATH unless overridden.
    pub program: String,
}

impl SshClient {
    pub fn from_server(server: &Server) -> Result<Self> {
        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        server.host.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.host);
        if is_local {
            log_status!("ssh", "Host '{}' is local, running commands directly", server.host);
        }

        Ok(Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            is_local,
            program: "ssh".to_string(),
        })
    }

    /// Client that runs every command on this machine.
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            user: String::new(),
            port: 22,
            identity_file: None,
            is_local: true,
            program: "ssh".to_string(),
        }
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        for option in SSH_OPTIONS {
            args.push("-o".to_string());
            args.push(option.to_string());
        }

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    /// Run over ssh, retrying only when ssh never reached the remote shell.
    /// A command that started and failed is never run again.
    fn execute_with_retry(&self, command: &str, stdin: Option<&str>) -> CommandOutput {
        let mut output = self.execute_once(command, stdin);

        for (attempt, delay) in RETRY_DELAYS_SECS.iter().enumerate() {
            if output.success
                || !is_connection_failure(output.exit_code, &output.stdout, &output.stderr)
            {
                break;
            }
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s",
                self.host,
                attempt + 1,
                RETRY_DELAYS_SECS.len() + 1,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(*delay));
            output = self.execute_once(command, stdin);
        }

        output
    }

    fn execute_once(&self, command: &str, stdin: Option<&str>) -> CommandOutput {
        if self.is_local {
            return execute_local(command, stdin);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_ssh_args(command));
        spawn_and_wait(cmd, stdin, "SSH error")
    }
}

impl RemoteExecutor for SshClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn run(&self, command: &RemoteCommand) -> CommandOutput {
        let line = command.to_shell();
        if self.is_local {
            // Local failures are never transient.
            return self.execute_once(&line, command.stdin.as_deref());
        }
        self.execute_with_retry(&line, command.stdin.as_deref())
    }
}

/// Run a shell command line on this machine.
pub(crate) fn execute_local(command: &str, stdin: Option<&str>) -> CommandOutput {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    spawn_and_wait(cmd, stdin, "Command error")
}

fn spawn_and_wait(mut cmd: Command, stdin: Option<&str>, context: &str) -> CommandOutput {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutput::failed(-1, format!("{}: {}", context, e)),
    };

    if let (Some(content), Some(mut pipe)) = (stdin, child.stdin.take()) {
        if let Err(e) = pipe.write_all(content.as_bytes()) {
            let _ = child.kill();
            let _ = child.wait();
            return CommandOutput::failed(-1, format!("{}: failed to write stdin: {}", context, e));
        }
        // Dropping the pipe closes stdin so the command sees EOF.
    }

    match child.wait_with_output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::failed(-1, format!("{}: {}", context, e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// True when ssh failed before the remote command started: ssh's exit status,
/// nothing on stdout, and every stderr line written by ssh itself. A remote
/// command that exits 255 (a PHP fatal error, say) does not qualify.
pub fn is_connection_failure(exit_code: i32, stdout: &str, stderr: &str) -> bool {
    if exit_code != SSH_CONNECTION_EXIT || !stdout.trim().is_empty() {
        return false;
    }
    let mut lines = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Warning:"))
        .peekable();
    lines.peek().is_some()
        && lines.all(|line| SSH_FAILURE_PREFIXES.iter().any(|p| line.starts_with(p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, port: u16, identity_file: Option<&str>) -> Server {
        Server {
            host: host.to_string(),
            user: "deploy".to_string(),
            port,
            identity_file: identity_file.map(String::from),
        }
    }

    #[test]
    fn ssh_args_carry_port_identity_and_batch_options() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let path = key.path().to_string_lossy().to_string();
        let client = SshClient::from_server(&server("web1.example.com", 2222, Some(&path))).unwrap();

        let args = client.build_ssh_args("ls -1 /srv/app/releases");
        assert_eq!(&args[..4], &["-i", path.as_str(), "-p", "2222"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@web1.example.com");
        assert_eq!(args[args.len() - 1], "ls -1 /srv/app/releases");
    }

    #[test]
    fn missing_identity_file_is_an_error() {
        let result = SshClient::from_server(&server(
            "web1.example.com",
            22,
            Some("/nonexistent/deckhand/key"),
        ));
        let err = result.err().unwrap();
        assert_eq!(err.code, crate::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn localhost_runs_locally() {
        let client = SshClient::from_server(&server("127.0.0.1", 22, None)).unwrap();
        assert!(client.is_local);

        let output = client.run(&RemoteCommand::new("echo").arg("hello world"));
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[test]
    fn local_run_feeds_stdin_and_honors_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_string_lossy().to_string();
        let client = SshClient::local();

        let output = client.run(
            &RemoteCommand::new("tee")
                .arg("REVISION")
                .in_dir(&dir_path)
                .with_stdin("abc123\n"),
        );
        assert!(output.success, "{}", output.stderr);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("REVISION")).unwrap(),
            "abc123\n"
        );
    }

    #[test]
    fn local_failure_reports_exit_code() {
        let output = SshClient::local().run(&RemoteCommand::new("test").args(["-e", "/nonexistent/deckhand"]));
        assert!(!output.success);
        assert_eq!(output.exit_code, 1);
    }

    #[test]
    fn only_ssh_connection_failures_are_retryable() {
        assert!(is_connection_failure(
            255,
            "",
            "ssh: connect to host web1 port 22: Connection refused\n"
        ));
        assert!(is_connection_failure(
            255,
            "",
            "Warning: Permanently added 'web1' (ED25519) to the list of known hosts.\n\
             kex_exchange_identification: Connection closed by remote host\n"
        ));
        assert!(is_connection_failure(
            255,
            "",
            "ssh: Could not resolve hostname web9: Name or service not known"
        ));

        assert!(!is_connection_failure(1, "", "ln: Permission denied"));
        assert!(!is_connection_failure(
            1,
            "",
            "SQLSTATE[HY000] [2002] Connection refused"
        ));
        assert!(!is_connection_failure(
            255,
            "",
            "PHP Fatal error:  Allowed memory size exhausted in update.inc"
        ));
        assert!(!is_connection_failure(
            255,
            "Performing system_update_8001\n",
            "ssh: connect to host db1 port 22: Connection refused"
        ));
        assert!(!is_connection_failure(
            128,
            "",
            "fatal: unable to access 'https://example.com/site.git/': Connection refused"
        ));
        assert!(!is_connection_failure(255, "", ""));
    }

    /// Stand-in for the ssh binary: logs each invocation, then fails the way `script` says.
    fn fake_ssh(dir: &std::path::Path, script: &str) -> SshClient {
        use std::os::unix::fs::PermissionsExt;

        let program = dir.join("ssh");
        let log = dir.join("invocations");
        std::fs::write(
            &program,
            format!("#!/bin/sh\necho run >> '{}'\n{}\n", log.display(), script),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        SshClient {
            program: program.to_string_lossy().to_string(),
            ..SshClient::from_server(&server("web1.example.com", 22, None)).unwrap()
        }
    }

    fn invocations(dir: &std::path::Path) -> usize {
        std::fs::read_to_string(dir.join("invocations"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn remote_command_that_exits_255_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_ssh(
            dir.path(),
            "echo 'PHP Fatal error:  Allowed memory size exhausted' >&2\nexit 255",
        );

        let output = client.run(&RemoteCommand::new("drush").args(["updatedb", "-y"]));

        assert!(!output.success);
        assert_eq!(output.exit_code, 255);
        assert_eq!(invocations(dir.path()), 1);
    }

    #[test]
    fn remote_connection_refused_from_mysql_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_ssh(
            dir.path(),
            "echo 'SQLSTATE[HY000] [2002] Connection refused' >&2\nexit 1",
        );

        let output = client.run(&RemoteCommand::new("drush").args(["updatedb", "-y"]));

        assert_eq!(output.exit_code, 1);
        assert_eq!(invocations(dir.path()), 1);
    }
}
