//! # Configuration
//!
//! This module turns the operator's inputs into the [`Settings`] a build runs
//! with. Values come from three places, highest precedence first:
//!
//! 1. command-line flags, or their `PVE_TEMPLATES_*` environment variables
//!    (both arrive here as [`Overrides`])
//! 2. an answerfile of shell-style `KEY=value` lines
//! 3. the built-in defaults in [`crate::defaults`]
//!
//! ## Answerfile
//!
//! ```text
//! # Build every Debian release and Ubuntu 24.04 on pve1
//! BUILD=debian,ubuntu2404
//! VMID_BASE=800
//! STORAGE=local-zfs
//! PACKER=Y
//! CLEANUP=N
//! REMOTE_HOST=pve1.example.net
//! PLAYBOOK="ansible/site.yml"
//! ```
//!
//! Booleans accept `Y`/`N`, `yes`/`no`, `true`/`false` and `1`/`0`. Unknown
//! keys are reported at `warn` and ignored.

use ini::{Ini, ParseOption};
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::defaults;
use crate::error::{Error, Result};
use crate::phases::FailurePolicy;
use crate::transport::{SshTarget, Transport};
use crate::vmid::BaseVmid;

/// Keys an answerfile may set.
pub const KNOWN_KEYS: &[&str] = &[
    "BUILD",
    "TEMPLATES",
    "VMID_BASE",
    "STORAGE",
    "REBUILD",
    "PACKER",
    "CLEANUP",
    "HALT_ON_ERROR",
    "REMOTE_HOST",
    "REMOTE_USER",
    "REMOTE_PORT",
    "SSH_KEY",
    "PLAYBOOK",
    "VARFILE",
    "PACKER_TEMPLATE",
    "BRIDGE",
    "MEMORY",
    "CORES",
    "DISK_SIZE",
    "WORK_DIR",
    "CATALOG",
];

/// Parsed `KEY=value` answerfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answerfile {
    values: BTreeMap<String, String>,
}

impl Answerfile {
    /// Parse answerfile content.
    pub fn parse(content: &str) -> Result<Self> {
        let options = ParseOption {
            enabled_quote: true,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let content: Vec<String> = content.lines().map(shell_line).collect();
        let ini = Ini::load_from_str_opt(&content.join("\n"), options).map_err(|e| Error::Config {
            message: format!("Answerfile is not valid KEY=value text: {}", e),
            hint: None,
        })?;

        let mut values = BTreeMap::new();
        for (section, properties) in ini.iter() {
            for (key, value) in properties.iter() {
                if let Some(section) = section {
                    warn!("Ignoring answerfile key {} in section [{}]", key, section);
                    continue;
                }
                let key = key.trim().to_ascii_uppercase();
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    warn!("Ignoring unknown answerfile key {}", key);
                    continue;
                }
                values.insert(key, value.trim().to_string());
            }
        }
        Ok(Self { values })
    }

    /// Read and parse an answerfile.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::parse(&content)
    }

    /// Raw value for `key`; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|v| parse_bool(key, v)).transpose()
    }

    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|v| {
                v.parse::<T>().map_err(|_| Error::Config {
                    message: format!("{} has an invalid value: '{}'", key, v),
                    hint: Some(format!("Check the type expected for {}", key)),
                })
            })
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reduce a shell assignment to plain `KEY=value`.
///
/// Drops a leading `export` and a trailing `# ...` or `; ...` comment that
/// sits outside quotes after whitespace.
fn shell_line(line: &str) -> String {
    let line = line.trim_start();
    if line.starts_with('#') || line.starts_with(';') {
        return line.to_string();
    }
    let line = line
        .strip_prefix("export")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .unwrap_or(line);
    let Some((key, value)) = line.split_once('=') else {
        return line.to_string();
    };

    let mut quote = None;
    let mut after_space = false;
    let mut end = value.len();
    for (i, c) in value.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '#' | ';') if after_space => {
                end = i;
                break;
            }
            _ => {}
        }
        after_space = c.is_whitespace();
    }
    format!("{}={}", key, value[..end].trim_end())
}

/// Interpret a shell-style boolean.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "on" => Ok(true),
        "n" | "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(Error::Config {
            message: format!("{} has an invalid boolean value: '{}'", key, value),
            hint: Some("Use Y or N".to_string()),
        }),
    }
}

/// Hardware and layout of imported base templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestSettings {
    pub memory_mb: u32,
    pub cores: u32,
    pub bridge: String,
    /// Final size of the boot disk, as accepted by `qm resize`.
    pub disk_size: String,
    /// Download directory on the Proxmox host.
    pub work_dir: String,
}

impl Default for GuestSettings {
    fn default() -> Self {
        Self {
            memory_mb: defaults::DEFAULT_MEMORY_MB,
            cores: defaults::DEFAULT_CORES,
            bridge: defaults::DEFAULT_BRIDGE.to_string(),
            disk_size: defaults::DEFAULT_DISK_SIZE.to_string(),
            work_dir: defaults::DEFAULT_WORK_DIR.to_string(),
        }
    }
}

/// Inputs of the Packer customization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomizeSettings {
    pub packer_template: PathBuf,
    pub playbook: PathBuf,
    pub varfile: Option<PathBuf>,
}

/// Values given on the command line or through the environment.
///
/// `None` means "not given", so lower-precedence sources may fill it in.
/// Switches carry `Some(false)` when explicitly turned off.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub selection: Option<String>,
    pub vmid_base: Option<u64>,
    pub storage: Option<String>,
    pub rebuild: Option<bool>,
    pub customize: Option<bool>,
    pub cleanup: Option<bool>,
    pub halt_on_error: Option<bool>,
    pub remote_host: Option<String>,
    pub remote_user: Option<String>,
    pub remote_port: Option<u16>,
    pub ssh_key: Option<PathBuf>,
    pub playbook: Option<PathBuf>,
    pub varfile: Option<PathBuf>,
    pub packer_template: Option<PathBuf>,
    pub bridge: Option<String>,
    pub memory_mb: Option<u32>,
    pub cores: Option<u32>,
    pub disk_size: Option<String>,
    pub work_dir: Option<String>,
    pub catalog: Option<PathBuf>,
}

/// Fully resolved configuration of one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Raw selection expression; empty means every distribution.
    pub selection: String,
    pub base: BaseVmid,
    pub storage_pool: String,
    pub rebuild: bool,
    pub customize: bool,
    pub cleanup: bool,
    pub failure_policy: FailurePolicy,
    pub transport: Transport,
    pub guest: GuestSettings,
    /// Present exactly when `customize` is set.
    pub customization: Option<CustomizeSettings>,
    pub catalog: Option<PathBuf>,
}

impl Settings {
    /// Merge overrides, answerfile and defaults.
    pub fn resolve(overrides: &Overrides, answers: Option<&Answerfile>) -> Result<Self> {
        let empty = Answerfile::default();
        let answers = answers.unwrap_or(&empty);

        let selection = overrides
            .selection
            .clone()
            .or_else(|| answers.get("BUILD").map(str::to_string))
            .or_else(|| answers.get("TEMPLATES").map(str::to_string))
            .unwrap_or_default();

        let base_value = match overrides.vmid_base {
            Some(base) => base,
            None => answers
                .get_parsed::<u64>("VMID_BASE")?
                .unwrap_or(defaults::DEFAULT_VMID_BASE),
        };
        let base = BaseVmid::new(base_value)?;

        let storage_pool = overrides
            .storage
            .clone()
            .or_else(|| answers.get("STORAGE").map(str::to_string))
            .unwrap_or_else(|| defaults::DEFAULT_STORAGE.to_string());

        let switch = |given: Option<bool>, key: &str| -> Result<bool> {
            Ok(match given {
                Some(value) => value,
                None => answers.get_bool(key)?.unwrap_or(false),
            })
        };
        let rebuild = switch(overrides.rebuild, "REBUILD")?;
        let customize = switch(overrides.customize, "PACKER")?;
        let cleanup = switch(overrides.cleanup, "CLEANUP")?;
        let halt = switch(overrides.halt_on_error, "HALT_ON_ERROR")?;
        let failure_policy = if halt {
            FailurePolicy::Halt
        } else {
            FailurePolicy::Continue
        };

        if cleanup && !customize {
            warn!("Cleanup only removes base templates after customization; ignoring it without Packer");
        }

        let transport = resolve_transport(overrides, answers)?;
        let guest = resolve_guest(overrides, answers)?;

        let customization = if customize {
            let playbook = overrides
                .playbook
                .clone()
                .or_else(|| answers.get("PLAYBOOK").map(PathBuf::from))
                .ok_or_else(|| Error::Config {
                    message: "Customization is enabled but no playbook is configured".to_string(),
                    hint: Some("Pass --playbook <FILE> or set PLAYBOOK= in the answerfile".to_string()),
                })?;
            Some(CustomizeSettings {
                packer_template: overrides
                    .packer_template
                    .clone()
                    .or_else(|| answers.get("PACKER_TEMPLATE").map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_PACKER_TEMPLATE)),
                playbook,
                varfile: overrides
                    .varfile
                    .clone()
                    .or_else(|| answers.get("VARFILE").map(PathBuf::from)),
            })
        } else {
            None
        };

        let catalog = overrides
            .catalog
            .clone()
            .or_else(|| answers.get("CATALOG").map(PathBuf::from));

        Ok(Self {
            selection,
            base,
            storage_pool,
            rebuild,
            customize,
            cleanup: cleanup && customize,
            failure_policy,
            transport,
            guest,
            customization,
            catalog,
        })
    }
}

fn resolve_transport(overrides: &Overrides, answers: &Answerfile) -> Result<Transport> {
    let host = overrides
        .remote_host
        .clone()
        .or_else(|| answers.get("REMOTE_HOST").map(str::to_string));

    let Some(host) = host else {
        return Ok(Transport::Local);
    };

    let user = overrides
        .remote_user
        .clone()
        .or_else(|| answers.get("REMOTE_USER").map(str::to_string))
        .unwrap_or_else(|| defaults::DEFAULT_REMOTE_USER.to_string());
    let port = match overrides.remote_port {
        Some(port) => Some(port),
        None => answers.get_parsed::<u16>("REMOTE_PORT")?,
    };
    let identity = overrides
        .ssh_key
        .clone()
        .or_else(|| answers.get("SSH_KEY").map(PathBuf::from));

    Ok(Transport::Ssh(SshTarget {
        host,
        user,
        port,
        identity,
    }))
}

fn resolve_guest(overrides: &Overrides, answers: &Answerfile) -> Result<GuestSettings> {
    let fallback = GuestSettings::default();
    let memory_mb = match overrides.memory_mb {
        Some(memory) => memory,
        None => answers.get_parsed("MEMORY")?.unwrap_or(fallback.memory_mb),
    };
    let cores = match overrides.cores {
        Some(cores) => cores,
        None => answers.get_parsed("CORES")?.unwrap_or(fallback.cores),
    };
    if memory_mb == 0 || cores == 0 {
        return Err(Error::Config {
            message: "Memory and cores must be greater than zero".to_string(),
            hint: None,
        });
    }
    Ok(GuestSettings {
        memory_mb,
        cores,
        bridge: overrides
            .bridge
            .clone()
            .or_else(|| answers.get("BRIDGE").map(str::to_string))
            .unwrap_or(fallback.bridge),
        disk_size: overrides
            .disk_size
            .clone()
            .or_else(|| answers.get("DISK_SIZE").map(str::to_string))
            .unwrap_or(fallback.disk_size),
        work_dir: overrides
            .work_dir
            .clone()
            .or_else(|| answers.get("WORK_DIR").map(str::to_string))
            .unwrap_or(fallback.work_dir),
    })
}
