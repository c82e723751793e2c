//! Default values for pve-templates configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Base VMID used when neither flag, environment nor answerfile sets one.
pub const DEFAULT_VMID_BASE: u64 = 9000;

/// Proxmox storage pool receiving imported disks and cloud-init drives.
pub const DEFAULT_STORAGE: &str = "local-lvm";

/// Login used for SSH when only a host is given.
pub const DEFAULT_REMOTE_USER: &str = "root";

pub const DEFAULT_BRIDGE: &str = "vmbr0";
pub const DEFAULT_MEMORY_MB: u32 = 2048;
pub const DEFAULT_CORES: u32 = 2;
pub const DEFAULT_DISK_SIZE: &str = "20G";

/// Directory on the Proxmox host that holds downloaded images.
pub const DEFAULT_WORK_DIR: &str = "/var/tmp/pve-templates";

/// Packer template (file or directory) used for customization.
pub const DEFAULT_PACKER_TEMPLATE: &str = "packer";

/// Returns the default answerfile location.
///
/// Uses the platform configuration directory:
/// - Linux: `~/.config/pve-templates/answers.env` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/pve-templates/answers.env`
///
/// Returns `None` if the platform configuration directory cannot be
/// determined. The file is only read when it exists.
pub fn default_answerfile_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pve-templates").join("answers.env"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_answerfile_path_file_name() {
        if let Some(path) = default_answerfile_path() {
            assert!(path.ends_with("pve-templates/answers.env"));
        }
    }

    #[test]
    fn test_default_base_leaves_room_for_reserved_range() {
        assert!(crate::vmid::BaseVmid::new(DEFAULT_VMID_BASE).is_ok());
    }
}
