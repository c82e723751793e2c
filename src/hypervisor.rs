//! # Hypervisor Operations
//!
//! The orchestrator never talks to Proxmox directly. It goes through the
//! [`Hypervisor`] trait, whose four operations are the boundary of this
//! crate:
//!
//! - **`vm_exists`**: does a VM or template with this VMID exist
//! - **`destroy`**: tear a VMID down; absent VMIDs are a no-op
//! - **`create_base_template`**: download a cloud image, import it into a new
//!   VM, configure it and convert it to a template
//! - **`customize_template`**: run Packer (with its Ansible provisioner)
//!   against a clone of the base template
//!
//! [`ProxmoxHost`] implements the trait with `qm`, `curl` and `packer`
//! command lines. Tests substitute their own implementation to simulate
//! existing VMs and failing tools without a Proxmox node.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::catalog::DistroDescriptor;
use crate::config::GuestSettings;
use crate::error::ExternalToolError;
use crate::transport::{argv, Transport};
use crate::vmid::{Phase, VmId};

/// Everything Packer needs to produce a customized template.
#[derive(Debug, Clone, Copy)]
pub struct CustomizeRequest<'a> {
    /// VMID of the template Packer creates.
    pub vmid: VmId,
    /// Base template Packer clones.
    pub clone_source: VmId,
    pub distro: &'a DistroDescriptor,
    pub storage_pool: &'a str,
    pub playbook: &'a Path,
    pub varfile: Option<&'a Path>,
}

/// Operations the build pipeline needs from the virtualization host.
pub trait Hypervisor {
    /// Whether a VM or template with `vmid` exists.
    fn vm_exists(&self, vmid: VmId) -> Result<bool, ExternalToolError>;

    /// Destroy `vmid` and its disks. Destroying an absent VMID succeeds.
    fn destroy(&self, vmid: VmId) -> Result<(), ExternalToolError>;

    /// Import the distribution's cloud image as template `vmid`.
    fn create_base_template(
        &self,
        vmid: VmId,
        distro: &DistroDescriptor,
        storage_pool: &str,
    ) -> Result<(), ExternalToolError>;

    /// Build the customized template described by `request`.
    fn customize_template(&self, request: &CustomizeRequest<'_>)
        -> Result<(), ExternalToolError>;
}

/// Name given to a template on the Proxmox node.
///
/// Proxmox names must be DNS labels, so the display name is lowercased and
/// dots become dashes.
pub fn template_name(distro: &DistroDescriptor, phase: Phase) -> String {
    let label: String = distro
        .display_name()
        .chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect();
    match phase {
        Phase::Base => format!("tpl-{}", label),
        Phase::Customized => format!("tpl-{}-custom", label),
    }
}

/// Where the cloud image of `distro` is stored on the host.
pub fn image_path(distro: &DistroDescriptor, guest: &GuestSettings) -> String {
    format!(
        "{}/{}",
        guest.work_dir.trim_end_matches('/'),
        distro.image_file_name()
    )
}

/// Command lines that turn a cloud image into base template `vmid`.
pub fn base_template_commands(
    vmid: VmId,
    distro: &DistroDescriptor,
    storage_pool: &str,
    guest: &GuestSettings,
) -> Vec<Vec<String>> {
    let id = vmid.to_string();
    let image = image_path(distro, guest);
    vec![
        argv(["mkdir", "-p", guest.work_dir.as_str()]),
        argv([
            "curl",
            "-fsSL",
            "--retry",
            "3",
            "-o",
            image.as_str(),
            distro.source(),
        ]),
        vec![
            "qm".to_string(),
            "create".to_string(),
            id.clone(),
            "--name".to_string(),
            template_name(distro, Phase::Base),
            "--memory".to_string(),
            guest.memory_mb.to_string(),
            "--cores".to_string(),
            guest.cores.to_string(),
            "--net0".to_string(),
            format!("virtio,bridge={}", guest.bridge),
            "--scsihw".to_string(),
            "virtio-scsi-single".to_string(),
            "--ostype".to_string(),
            "l26".to_string(),
        ],
        argv(["qm", "set", id.as_str(), "--serial0", "socket", "--vga", "serial0"]),
        vec![
            "qm".to_string(),
            "set".to_string(),
            id.clone(),
            "--scsi0".to_string(),
            format!("{}:0,import-from={}", storage_pool, image),
        ],
        argv(["qm", "set", id.as_str(), "--boot", "order=scsi0"]),
        argv(["qm", "set", id.as_str(), "--agent", "enabled=1"]),
        vec![
            "qm".to_string(),
            "set".to_string(),
            id.clone(),
            "--ide2".to_string(),
            format!("{}:cloudinit", storage_pool),
        ],
        argv(["qm", "resize", id.as_str(), "scsi0", guest.disk_size.as_str()]),
        argv(["qm", "template", id.as_str()]),
    ]
}

/// The `packer build` command line for `request`.
pub fn packer_command(request: &CustomizeRequest<'_>, packer_template: &Path) -> Vec<String> {
    let mut command = argv(["packer", "build", "-force"]);
    let vars = [
        ("vm_id", request.vmid.to_string()),
        ("clone_vm_id", request.clone_source.to_string()),
        ("template_name", template_name(request.distro, Phase::Customized)),
        ("distro", request.distro.id().to_string()),
        ("storage_pool", request.storage_pool.to_string()),
        ("ansible_playbook", request.playbook.display().to_string()),
    ];
    for (name, value) in vars {
        command.push("-var".to_string());
        command.push(format!("{}={}", name, value));
    }
    if let Some(varfile) = request.varfile {
        command.push(format!("-var-file={}", varfile.display()));
    }
    command.push(packer_template.display().to_string());
    command
}

/// `qm status` reports a missing VM through its configuration file.
fn reports_missing_vm(stderr: &str) -> bool {
    stderr.contains("does not exist")
}

/// A Proxmox VE node driven through `qm`.
pub struct ProxmoxHost {
    transport: Transport,
    guest: GuestSettings,
    packer_template: PathBuf,
}

impl ProxmoxHost {
    pub fn new(transport: Transport, guest: GuestSettings, packer_template: PathBuf) -> Self {
        Self {
            transport,
            guest,
            packer_template,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

impl Hypervisor for ProxmoxHost {
    fn vm_exists(&self, vmid: VmId) -> Result<bool, ExternalToolError> {
        let command = argv(["qm", "status", vmid.to_string().as_str()]);
        let output = self.transport.run(&command)?;
        if output.success() {
            return Ok(true);
        }
        if reports_missing_vm(&output.stderr) {
            return Ok(false);
        }
        Err(ExternalToolError {
            tool: "qm".to_string(),
            command: shell_words::join(&command),
            status: output.status,
            stderr: output.stderr,
        })
    }

    fn destroy(&self, vmid: VmId) -> Result<(), ExternalToolError> {
        if !self.vm_exists(vmid)? {
            debug!("VMID {} does not exist, nothing to destroy", vmid);
            return Ok(());
        }
        info!("Destroying VMID {} on {}", vmid, self.transport);
        self.transport.run_checked(&argv([
            "qm",
            "destroy",
            vmid.to_string().as_str(),
            "--purge",
            "--destroy-unreferenced-disks",
            "1",
        ]))?;
        Ok(())
    }

    fn create_base_template(
        &self,
        vmid: VmId,
        distro: &DistroDescriptor,
        storage_pool: &str,
    ) -> Result<(), ExternalToolError> {
        info!(
            "Creating base template {} for {} on {}",
            vmid,
            distro.id(),
            self.transport
        );
        let result = base_template_commands(vmid, distro, storage_pool, &self.guest)
            .iter()
            .try_for_each(|command| self.transport.run_checked(command).map(drop));

        // The image is only an import source; drop it whether or not the import worked.
        let image = image_path(distro, &self.guest);
        if let Err(e) = self.transport.run_checked(&argv(["rm", "-f", image.as_str()])) {
            warn!("Could not remove downloaded image {}: {}", image, e);
        }
        result
    }

    fn customize_template(
        &self,
        request: &CustomizeRequest<'_>,
    ) -> Result<(), ExternalToolError> {
        info!(
            "Customizing {} into template {} from clone of {}",
            request.distro.id(),
            request.vmid,
            request.clone_source
        );
        // Packer drives the Proxmox API and reads playbooks from this machine.
        Transport::Local.run_checked(&packer_command(request, &self.packer_template))?;
        Ok(())
    }
}
