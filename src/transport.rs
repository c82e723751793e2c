//! # Transport Adapter
//!
//! Runs a command line on the Proxmox host. The host is either the machine
//! this tool runs on, or a remote node reached through the system `ssh`
//! binary, which picks up keys from `~/.ssh/`, the agent and `~/.ssh/config`.
//!
//! Remote command lines are quoted with `shell-words` so arguments survive
//! the remote login shell unchanged.

use log::debug;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use crate::error::ExternalToolError;

/// `ssh` reserves this exit status for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;

/// Where a remote Proxmox node is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: Option<u16>,
    pub identity: Option<PathBuf>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: None,
            identity: None,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// How commands reach the hypervisor host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Run commands as child processes of this tool.
    Local,
    /// Run commands through `ssh`.
    Ssh(SshTarget),
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => write!(f, "local host"),
            Transport::Ssh(target) => match target.port {
                Some(port) => write!(f, "{}:{}", target.destination(), port),
                None => write!(f, "{}", target.destination()),
            },
        }
    }
}

impl Transport {
    /// Build the process that executes `argv` on the target host.
    pub fn command(&self, argv: &[String]) -> Command {
        match self {
            Transport::Local => {
                let mut cmd = Command::new(&argv[0]);
                cmd.args(&argv[1..]);
                cmd
            }
            Transport::Ssh(target) => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"]);
                if let Some(port) = target.port {
                    cmd.arg("-p").arg(port.to_string());
                }
                if let Some(identity) = &target.identity {
                    cmd.arg("-i").arg(identity);
                }
                cmd.arg(target.destination());
                cmd.arg("--");
                cmd.arg(shell_words::join(argv));
                cmd
            }
        }
    }

    /// Run `argv` and capture its output, whatever the exit status.
    ///
    /// Only a failure to start the process (or a failed SSH connection) is
    /// an error here.
    pub fn run(&self, argv: &[String]) -> Result<CommandOutput, ExternalToolError> {
        let line = shell_words::join(argv);
        debug!("[{}] {}", self, line);

        let output = self
            .command(argv)
            .output()
            .map_err(|e| ExternalToolError {
                tool: self.spawned_program(argv),
                command: line.clone(),
                status: None,
                stderr: e.to_string(),
            })?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if matches!(self, Transport::Ssh(_)) && result.status == Some(SSH_FAILURE_STATUS) {
            return Err(ExternalToolError {
                tool: "ssh".to_string(),
                command: format!("{} on {}", line, self),
                status: result.status,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }

    /// Run `argv`, treating any non-zero exit status as an error.
    pub fn run_checked(&self, argv: &[String]) -> Result<CommandOutput, ExternalToolError> {
        let output = self.run(argv)?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExternalToolError {
                tool: argv[0].clone(),
                command: shell_words::join(argv),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    fn spawned_program(&self, argv: &[String]) -> String {
        match self {
            Transport::Local => argv[0].clone(),
            Transport::Ssh(_) => "ssh".to_string(),
        }
    }
}

/// Build an owned argument vector from string-like parts.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_local_command_runs_program_directly() {
        let cmd = Transport::Local.command(&argv(["qm", "status", "802"]));
        assert_eq!(cmd.get_program(), OsStr::new("qm"));
        assert_eq!(args_of(&cmd), vec!["status", "802"]);
    }

    #[test]
    fn test_ssh_command_wraps_and_quotes() {
        let mut target = SshTarget::new("pve1", "root");
        target.port = Some(2222);
        target.identity = Some(PathBuf::from("/home/op/.ssh/id_ed25519"));
        let transport = Transport::Ssh(target);

        let cmd = transport.command(&argv(["qm", "create", "802", "--name", "tpl debian"]));
        assert_eq!(cmd.get_program(), OsStr::new("ssh"));
        assert_eq!(
            args_of(&cmd),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-p",
                "2222",
                "-i",
                "/home/op/.ssh/id_ed25519",
                "root@pve1",
                "--",
                "qm create 802 --name 'tpl debian'",
            ]
        );
    }

    #[test]
    fn test_ssh_without_port_or_identity() {
        let transport = Transport::Ssh(SshTarget::new("pve1", "root"));
        let args = args_of(&transport.command(&argv(["qm", "list"])));
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args[args.len() - 3..], ["root@pve1", "--", "qm list"]);
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(Transport::Local.to_string(), "local host");
        let mut target = SshTarget::new("pve1", "root");
        assert_eq!(Transport::Ssh(target.clone()).to_string(), "root@pve1");
        target.port = Some(22);
        assert_eq!(Transport::Ssh(target).to_string(), "root@pve1:22");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output() {
        let output = Transport::Local
            .run(&argv(["sh", "-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_checked_reports_failure() {
        let err = Transport::Local
            .run_checked(&argv(["sh", "-c", "echo boom >&2; exit 2"]))
            .unwrap_err();
        assert_eq!(err.tool, "sh");
        assert_eq!(err.status, Some(2));
        assert!(err.stderr.contains("boom"));
    }

    #[test]
    fn test_spawn_failure_is_external_tool_error() {
        let err = Transport::Local
            .run(&argv(["pve-templates-no-such-binary"]))
            .unwrap_err();
        assert_eq!(err.tool, "pve-templates-no-such-binary");
        assert_eq!(err.status, None);
    }
}
