//! Preflight checks for host tools.
//!
//! Which programs must be on this machine's `PATH` depends on the run:
//! `qm` and `curl` when the Proxmox node is local, `ssh` when it is remote,
//! and `packer` plus `ansible-playbook` when customizing.

use crate::transport::Transport;

/// A program the run cannot do without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRequirement {
    pub tool: &'static str,
    /// Package that provides the tool on Debian-based systems.
    pub package: &'static str,
    /// What the tool is used for, e.g. "to reach the Proxmox host".
    pub reason: &'static str,
}

const QM: ToolRequirement = ToolRequirement {
    tool: "qm",
    package: "qemu-server",
    reason: "to manage VMs on the local Proxmox node",
};

const CURL: ToolRequirement = ToolRequirement {
    tool: "curl",
    package: "curl",
    reason: "to download cloud images",
};

const SSH: ToolRequirement = ToolRequirement {
    tool: "ssh",
    package: "openssh-client",
    reason: "to reach the Proxmox host",
};

const PACKER: ToolRequirement = ToolRequirement {
    tool: "packer",
    package: "packer",
    reason: "to customize templates",
};

const ANSIBLE: ToolRequirement = ToolRequirement {
    tool: "ansible-playbook",
    package: "ansible",
    reason: "to run the customization playbook",
};

/// Check if a command exists in `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools needed for a run over `transport`.
pub fn required_tools(transport: &Transport, customize: bool) -> Vec<ToolRequirement> {
    let mut tools = match transport {
        Transport::Local => vec![QM, CURL],
        Transport::Ssh(_) => vec![SSH],
    };
    if customize {
        tools.push(PACKER);
        tools.push(ANSIBLE);
    }
    tools
}

/// Requirements from `tools` that are not installed.
pub fn missing_tools(tools: &[ToolRequirement]) -> Vec<ToolRequirement> {
    tools
        .iter()
        .filter(|t| !command_exists(t.tool))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SshTarget;

    fn names(tools: &[ToolRequirement]) -> Vec<&str> {
        tools.iter().map(|t| t.tool).collect()
    }

    #[test]
    fn test_local_run_needs_qm_and_curl() {
        assert_eq!(names(&required_tools(&Transport::Local, false)), vec!["qm", "curl"]);
    }

    #[test]
    fn test_remote_run_needs_ssh_only() {
        let transport = Transport::Ssh(SshTarget::new("pve1", "root"));
        assert_eq!(names(&required_tools(&transport, false)), vec!["ssh"]);
        assert_eq!(
            names(&required_tools(&transport, true)),
            vec!["ssh", "packer", "ansible-playbook"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_missing_tools_lists_absent_programs() {
        let fake = ToolRequirement {
            tool: "nonexistent_command_xyz",
            package: "fake-package",
            reason: "for testing",
        };
        assert_eq!(missing_tools(&[fake]), vec![fake]);
    }
}
