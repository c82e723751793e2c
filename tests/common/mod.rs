//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and a recording
//! hypervisor to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_answerfile(answers::DEBIAN_ONLY);
//!     fixture.command().arg("plan").assert().success();
//! }
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use pve_templates::catalog::DistroDescriptor;
use pve_templates::error::ExternalToolError;
use pve_templates::hypervisor::{CustomizeRequest, Hypervisor};
use pve_templates::vmid::VmId;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::answers;
    #[allow(unused_imports)]
    pub use super::{Call, RecordingHypervisor};
    pub use super::TestFixture;
}

/// Answerfile snippets for testing.
pub mod answers {
    /// Debian 12 only, base 800.
    pub const DEBIAN_ONLY: &str = "BUILD=debian12\nVMID_BASE=800\n";

    /// The two-distribution scenario used throughout the docs.
    pub const DEBIAN_AND_UBUNTU: &str = "\
# lab defaults
BUILD=debian12,ubuntu2404
VMID_BASE=800
STORAGE=local-lvm
";

    /// Malformed boolean.
    pub const BAD_BOOL: &str = "BUILD=debian12\nREBUILD=maybe\n";
}

/// One hypervisor operation, as seen by [`RecordingHypervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(u32),
    Destroy(u32),
    CreateBase { vmid: u32, distro: String },
    Customize { vmid: u32, clone_source: u32, distro: String },
}

/// In-memory hypervisor that records every call.
///
/// VMs listed in `existing` are reported as present; operations for distros
/// listed in the failure maps fail with an [`ExternalToolError`].
#[derive(Default)]
pub struct RecordingHypervisor {
    existing: RefCell<BTreeSet<u32>>,
    calls: RefCell<Vec<Call>>,
    failing_creates: BTreeSet<String>,
    failing_customizations: BTreeSet<String>,
    failing_destroys: BTreeSet<u32>,
    failing_probes: BTreeMap<u32, String>,
}

impl RecordingHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `vmids` already exist.
    pub fn with_existing(self, vmids: &[u32]) -> Self {
        self.existing.borrow_mut().extend(vmids.iter().copied());
        self
    }

    pub fn failing_create(mut self, distro: &str) -> Self {
        self.failing_creates.insert(distro.to_string());
        self
    }

    pub fn failing_customize(mut self, distro: &str) -> Self {
        self.failing_customizations.insert(distro.to_string());
        self
    }

    pub fn failing_destroy(mut self, vmid: u32) -> Self {
        self.failing_destroys.insert(vmid);
        self
    }

    pub fn failing_probe(mut self, vmid: u32, stderr: &str) -> Self {
        self.failing_probes.insert(vmid, stderr.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Calls that change the host, in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Exists(_)))
            .collect()
    }

    pub fn exists(&self, vmid: u32) -> bool {
        self.existing.borrow().contains(&vmid)
    }

    fn fail(tool: &str, command: String) -> ExternalToolError {
        ExternalToolError {
            tool: tool.to_string(),
            command,
            status: Some(1),
            stderr: "simulated failure".to_string(),
        }
    }
}

impl Hypervisor for RecordingHypervisor {
    fn vm_exists(&self, vmid: VmId) -> Result<bool, ExternalToolError> {
        self.calls.borrow_mut().push(Call::Exists(vmid.get()));
        if let Some(stderr) = self.failing_probes.get(&vmid.get()) {
            return Err(ExternalToolError {
                tool: "ssh".to_string(),
                command: format!("qm status {}", vmid),
                status: Some(255),
                stderr: stderr.clone(),
            });
        }
        Ok(self.exists(vmid.get()))
    }

    fn destroy(&self, vmid: VmId) -> Result<(), ExternalToolError> {
        self.calls.borrow_mut().push(Call::Destroy(vmid.get()));
        if self.failing_destroys.contains(&vmid.get()) {
            return Err(Self::fail("qm", format!("qm destroy {}", vmid)));
        }
        self.existing.borrow_mut().remove(&vmid.get());
        Ok(())
    }

    fn create_base_template(
        &self,
        vmid: VmId,
        distro: &DistroDescriptor,
        _storage_pool: &str,
    ) -> Result<(), ExternalToolError> {
        self.calls.borrow_mut().push(Call::CreateBase {
            vmid: vmid.get(),
            distro: distro.id().to_string(),
        });
        if self.failing_creates.contains(distro.id()) {
            return Err(Self::fail("curl", format!("curl {}", distro.source())));
        }
        self.existing.borrow_mut().insert(vmid.get());
        Ok(())
    }

    fn customize_template(&self, request: &CustomizeRequest<'_>) -> Result<(), ExternalToolError> {
        self.calls.borrow_mut().push(Call::Customize {
            vmid: request.vmid.get(),
            clone_source: request.clone_source.get(),
            distro: request.distro.id().to_string(),
        });
        if self.failing_customizations.contains(request.distro.id()) {
            return Err(Self::fail("packer", "packer build".to_string()));
        }
        self.existing.borrow_mut().insert(request.vmid.get());
        Ok(())
    }
}

/// Fake `qm`: logs its arguments and tracks VMs as files in `$FAKE_PVE_STATE`.
/// Fails for command lines containing `$FAKE_QM_FAIL`.
const FAKE_QM: &str = r#"#!/bin/sh
echo "qm $*" >> "$FAKE_PVE_LOG"
if [ -n "$FAKE_QM_FAIL" ]; then
  case "$*" in
    *"$FAKE_QM_FAIL"*) echo "qm: command failed" >&2; exit 255 ;;
  esac
fi
case "$1" in
  status)
    if [ -e "$FAKE_PVE_STATE/$2" ]; then
      echo "status: stopped"
    else
      echo "Configuration file 'nodes/pve/qemu-server/$2.conf' does not exist" >&2
      exit 2
    fi
    ;;
  create) touch "$FAKE_PVE_STATE/$2" ;;
  destroy) rm -f "$FAKE_PVE_STATE/$2" ;;
esac
exit 0
"#;

/// Fake `curl`: logs its arguments and creates the `-o` file; fails for URLs
/// containing `$FAKE_CURL_FAIL`.
const FAKE_CURL: &str = r#"#!/bin/sh
echo "curl $*" >> "$FAKE_PVE_LOG"
if [ -n "$FAKE_CURL_FAIL" ]; then
  case "$*" in
    *"$FAKE_CURL_FAIL"*) echo "curl: (22) The requested URL returned error: 404" >&2; exit 22 ;;
  esac
fi
prev=""
for arg in "$@"; do
  [ "$prev" = "-o" ] && : > "$arg"
  prev="$arg"
done
exit 0
"#;

/// Fake `packer`: logs its arguments.
const FAKE_PACKER: &str = r#"#!/bin/sh
echo "packer $*" >> "$FAKE_PVE_LOG"
exit 0
"#;

/// Fake `ansible-playbook`; only its presence on `PATH` matters.
const FAKE_ANSIBLE: &str = "#!/bin/sh\nexit 0\n";

/// A test fixture that provides a temporary directory for answerfiles,
/// catalogs and fake Proxmox tools.
///
/// Commands created by the fixture never read the operator's real
/// configuration: `XDG_CONFIG_HOME` points into the fixture and every
/// `PVE_TEMPLATES_*` variable is cleared.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("config")
            .create_dir_all()
            .expect("Failed to create config directory");
        Self { temp_dir }
    }

    /// Add `answers.env` with the given content.
    pub fn with_answerfile(self, content: &str) -> Self {
        self.with_file("answers.env", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Install fake `qm`, `curl`, `packer` and `ansible-playbook` into `bin/`,
    /// prepended to `PATH` by [`TestFixture::command`].
    #[cfg(unix)]
    pub fn with_fake_proxmox(self) -> Self {
        use std::os::unix::fs::PermissionsExt;

        for (name, script) in [
            ("qm", FAKE_QM),
            ("curl", FAKE_CURL),
            ("packer", FAKE_PACKER),
            ("ansible-playbook", FAKE_ANSIBLE),
        ] {
            let child = self.temp_dir.child(format!("bin/{}", name));
            child.write_str(script).expect("Failed to write fake tool");
            std::fs::set_permissions(child.path(), std::fs::Permissions::from_mode(0o755))
                .expect("Failed to make fake tool executable");
        }
        self.temp_dir
            .child("state")
            .create_dir_all()
            .expect("Failed to create state directory");
        self.temp_dir
            .child("images")
            .create_dir_all()
            .expect("Failed to create image directory");
        self
    }

    /// Mark `vmid` as existing on the fake node.
    pub fn with_existing_vm(self, vmid: u32) -> Self {
        self.with_file(&format!("state/{}", vmid), "")
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn answerfile_path(&self) -> PathBuf {
        self.path().join("answers.env")
    }

    /// Directory the fake node downloads images into.
    pub fn images_dir(&self) -> PathBuf {
        self.path().join("images")
    }

    /// Every command line the fake tools saw, in order.
    pub fn tool_log(&self) -> Vec<String> {
        std::fs::read_to_string(self.path().join("tool.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn vm_exists(&self, vmid: u32) -> bool {
        self.path().join("state").join(vmid.to_string()).exists()
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command isolated from the operator's environment.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pve-templates");
        cmd.current_dir(self.path());
        cmd.env("XDG_CONFIG_HOME", self.path().join("config"));
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("RUST_LOG");
        for (key, _) in std::env::vars() {
            if key.starts_with("PVE_TEMPLATES_") {
                cmd.env_remove(key);
            }
        }

        let bin = self.path().join("bin");
        if bin.exists() {
            let path = std::env::var_os("PATH").unwrap_or_default();
            let mut dirs = vec![bin];
            dirs.extend(std::env::split_paths(&path));
            cmd.env("PATH", std::env::join_paths(dirs).expect("Invalid PATH"));
            cmd.env("FAKE_PVE_LOG", self.path().join("tool.log"));
            cmd.env("FAKE_PVE_STATE", self.path().join("state"));
        }
        cmd
    }

    /// Create a command with `--answerfile` pointing at the fixture's answerfile.
    pub fn command_with_answerfile(&self, subcommand: &str) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg(subcommand)
            .arg("--answerfile")
            .arg(self.answerfile_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
        assert!(fixture.path().join("config").is_dir());
    }

    #[test]
    fn test_fixture_with_answerfile() {
        let fixture = TestFixture::new().with_answerfile(answers::DEBIAN_ONLY);
        assert!(fixture.answerfile_path().exists());
    }

    #[test]
    fn test_recording_hypervisor_tracks_state() {
        let host = RecordingHypervisor::new().with_existing(&[802]);
        assert!(host.exists(802));
        host.destroy(VmId::new(802)).unwrap();
        assert!(!host.exists(802));
        assert_eq!(host.mutations(), vec![Call::Destroy(802)]);
    }
}
