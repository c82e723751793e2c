//! # Build Command Implementation
//!
//! This module implements the `build` subcommand, which turns the selected
//! distributions into Proxmox VE templates.
//!
//! ## Functionality
//!
//! - **Selection**: Distributions and groups from `--build`, the environment
//!   or the answerfile; everything in the catalog when none is given
//! - **Lifecycle Guard**: Existing VMIDs are left alone unless `--rebuild` is set
//! - **Customization**: `--packer` clones each base template and runs the
//!   Ansible playbook on it through Packer
//! - **Reporting**: A summary on stdout, optionally a JSON report file
//!
//! The command fails (exit status 1) when any distribution did not finish.

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Args;
use log::debug;
use std::path::{Path, PathBuf};

use pve_templates::catalog::Catalog;
use pve_templates::config::{Answerfile, Overrides, Settings};
use pve_templates::defaults;
use pve_templates::hypervisor::ProxmoxHost;
use pve_templates::output::{self, emoji, OutputConfig};
use pve_templates::phases::{orchestrator, BuildOptions};
use pve_templates::preflight;
use pve_templates::selection::{self, ResolvedSelection};
use pve_templates::suggestions;

/// Configuration flags shared by `build` and `plan`.
///
/// Every value may also come from a `PVE_TEMPLATES_*` environment variable
/// or the answerfile; flags win. Switches accept an optional value, so
/// `--rebuild=no` turns off `REBUILD=Y` from the answerfile.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Distributions and groups, e.g. "debian,ubuntu2404" (default: all)
    #[arg(
        long = "build",
        visible_alias = "templates",
        value_name = "SELECTION",
        env = "PVE_TEMPLATES_BUILD"
    )]
    pub selection: Option<String>,

    /// First VMID of the 200 reserved for templates
    #[arg(long, value_name = "N", env = "PVE_TEMPLATES_VMID_BASE")]
    pub vmid_base: Option<u64>,

    /// Storage pool for imported disks
    #[arg(long, value_name = "POOL", env = "PVE_TEMPLATES_STORAGE")]
    pub storage: Option<String>,

    /// Destroy and recreate templates whose VMIDs are in use
    #[arg(
        long,
        value_name = "BOOL",
        env = "PVE_TEMPLATES_REBUILD",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub rebuild: Option<bool>,

    /// Customize each template with Packer and Ansible
    #[arg(
        long = "packer",
        visible_alias = "customize",
        value_name = "BOOL",
        env = "PVE_TEMPLATES_PACKER",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub customize: Option<bool>,

    /// Remove base templates after customization
    #[arg(
        long,
        value_name = "BOOL",
        env = "PVE_TEMPLATES_CLEANUP",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub cleanup: Option<bool>,

    /// Stop at the first failed distribution
    #[arg(
        long,
        value_name = "BOOL",
        env = "PVE_TEMPLATES_HALT_ON_ERROR",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub halt_on_error: Option<bool>,

    /// Proxmox host to reach over SSH (default: run locally)
    #[arg(long, value_name = "HOST", env = "PVE_TEMPLATES_REMOTE_HOST")]
    pub remote: Option<String>,

    /// SSH login for --remote
    #[arg(long, value_name = "USER", env = "PVE_TEMPLATES_REMOTE_USER")]
    pub user: Option<String>,

    /// SSH port for --remote
    #[arg(long, value_name = "PORT", env = "PVE_TEMPLATES_REMOTE_PORT")]
    pub port: Option<u16>,

    /// SSH private key for --remote
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_SSH_KEY")]
    pub identity: Option<PathBuf>,

    /// Answerfile with KEY=value defaults.
    ///
    /// Defaults to `~/.config/pve-templates/answers.env` when that file exists.
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_ANSWERFILE")]
    pub answerfile: Option<PathBuf>,

    /// YAML catalog replacing the built-in distributions
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Ansible playbook run during customization
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_PLAYBOOK")]
    pub playbook: Option<PathBuf>,

    /// Extra Packer variables file
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_VARFILE")]
    pub varfile: Option<PathBuf>,

    /// Packer template file or directory
    #[arg(long, value_name = "PATH", env = "PVE_TEMPLATES_PACKER_TEMPLATE")]
    pub packer_template: Option<PathBuf>,

    /// Network bridge of the template NIC
    #[arg(long, value_name = "BRIDGE", env = "PVE_TEMPLATES_BRIDGE")]
    pub bridge: Option<String>,

    /// Template memory in MiB
    #[arg(long, value_name = "MIB", env = "PVE_TEMPLATES_MEMORY")]
    pub memory: Option<u32>,

    /// Template CPU cores
    #[arg(long, value_name = "N", env = "PVE_TEMPLATES_CORES")]
    pub cores: Option<u32>,

    /// Boot disk size, e.g. 20G
    #[arg(long, value_name = "SIZE", env = "PVE_TEMPLATES_DISK_SIZE")]
    pub disk_size: Option<String>,

    /// Download directory for cloud images on the Proxmox host
    #[arg(long, value_name = "DIR", env = "PVE_TEMPLATES_WORK_DIR")]
    pub work_dir: Option<String>,
}

/// Settings and selection of one invocation.
pub struct Loaded {
    pub settings: Settings,
    pub selection: ResolvedSelection,
}

impl ConfigArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            selection: self.selection.clone(),
            vmid_base: self.vmid_base,
            storage: self.storage.clone(),
            rebuild: self.rebuild,
            customize: self.customize,
            cleanup: self.cleanup,
            halt_on_error: self.halt_on_error,
            remote_host: self.remote.clone(),
            remote_user: self.user.clone(),
            remote_port: self.port,
            ssh_key: self.identity.clone(),
            playbook: self.playbook.clone(),
            varfile: self.varfile.clone(),
            packer_template: self.packer_template.clone(),
            bridge: self.bridge.clone(),
            memory_mb: self.memory,
            cores: self.cores,
            disk_size: self.disk_size.clone(),
            work_dir: self.work_dir.clone(),
            catalog: self.catalog.clone(),
        }
    }

    /// Resolve settings, then resolve the selection against the catalog.
    ///
    /// Nothing here touches the hypervisor.
    pub fn load(&self) -> Result<Loaded> {
        let answers = load_answerfile(self.answerfile.as_deref())?;
        let settings = Settings::resolve(&self.overrides(), answers.as_ref())?;
        let catalog = Catalog::load(settings.catalog.as_deref())?;
        let selection = selection::resolve(&settings.selection, &catalog)
            .map_err(|e| suggestions::invalid_selection(&e, &catalog))?;
        debug!("Selected {}", selection);
        Ok(Loaded {
            settings,
            selection,
        })
    }
}

fn load_answerfile(explicit: Option<&Path>) -> Result<Option<Answerfile>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(suggestions::answerfile_not_found(path));
        }
        let answers = Answerfile::from_file(path)
            .with_context(|| format!("Failed to read answerfile {}", path.display()))?;
        return Ok(Some(answers));
    }

    match defaults::default_answerfile_path() {
        Some(path) if path.is_file() => {
            debug!("Using answerfile {}", path.display());
            let answers = Answerfile::from_file(&path)
                .with_context(|| format!("Failed to read answerfile {}", path.display()))?;
            Ok(Some(answers))
        }
        _ => Ok(None),
    }
}

/// Build VM templates on a Proxmox node
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write a JSON report of every outcome to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Skip checks for required tools and files
    #[arg(long)]
    pub skip_preflight: bool,
}

/// Execute the `build` command.
pub fn execute(args: BuildArgs, output: &OutputConfig) -> Result<()> {
    let loaded = args.config.load()?;
    let settings = &loaded.settings;

    if !args.skip_preflight {
        run_preflight(settings)?;
    }

    let options = BuildOptions::from_settings(settings);
    let packer_template = settings
        .customization
        .as_ref()
        .map(|c| c.packer_template.clone())
        .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_PACKER_TEMPLATE));
    let host = ProxmoxHost::new(
        settings.transport.clone(),
        settings.guest.clone(),
        packer_template,
    );

    println!(
        "{} Building {} on {}",
        emoji(output, "\u{1F528}", "[BUILD]"),
        loaded.selection,
        host.transport()
    );

    let spinner = output::spinner(output, "build");
    let report = orchestrator::run_with_progress(&loaded.selection, &options, &host, |distro, state| {
        spinner.set_prefix(distro.to_string());
        spinner.set_message(state.to_string());
    });
    spinner.finish_and_clear();

    print!("{}", output::render_report(output, &report));

    if let Some(path) = &args.report {
        let json = report.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !report.is_success() {
        let unfinished = report.outcomes.len() - report.done_count();
        anyhow::bail!(
            "{} of {} distributions did not finish",
            unfinished,
            report.outcomes.len()
        );
    }
    Ok(())
}

fn run_preflight(settings: &Settings) -> Result<()> {
    let tools = preflight::required_tools(&settings.transport, settings.customize);
    if let Some(missing) = preflight::missing_tools(&tools).first() {
        return Err(suggestions::missing_tool(
            missing.tool,
            missing.package,
            missing.reason,
        ));
    }
    check_customization_files(settings)
}

/// Customization inputs are read on this machine and must exist.
fn check_customization_files(settings: &Settings) -> Result<()> {
    let Some(customization) = &settings.customization else {
        return Ok(());
    };
    for (what, path) in [
        ("Playbook", Some(&customization.playbook)),
        ("Packer template", Some(&customization.packer_template)),
        ("Packer variables file", customization.varfile.as_ref()),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("{} not found: {}", what, path.display());
            }
        }
    }
    Ok(())
}
