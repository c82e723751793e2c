//! # Plan Command Implementation
//!
//! This module implements the `plan` subcommand, which shows the VMIDs a
//! build would use for the current selection and base.
//!
//! With `--check` the Proxmox node is asked whether each VMID exists and the
//! lifecycle decision is shown next to it. The command is read-only: it never
//! destroys or creates anything, even with `--rebuild`.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::fmt::Write as _;

use pve_templates::config::GuestSettings;
use pve_templates::hypervisor::ProxmoxHost;
use pve_templates::lifecycle::LifecycleDecision;
use pve_templates::output::{emoji, OutputConfig};
use pve_templates::phases::consult_guard;
use pve_templates::vmid::{IdentifierPlan, VmId, RESERVED_RANGE};

use super::build::ConfigArgs;

/// Show the VMIDs a build would use
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Query the Proxmox node and show lifecycle decisions
    #[arg(long)]
    pub check: bool,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// One identifier of the plan with its guard decision.
#[derive(Debug, Clone, Serialize)]
struct PlannedVmid {
    vmid: VmId,
    #[serde(flatten)]
    decision: Option<LifecycleDecision>,
}

#[derive(Debug, Clone, Serialize)]
struct PlanEntry {
    distro: String,
    display_name: String,
    base: PlannedVmid,
    #[serde(skip_serializing_if = "Option::is_none")]
    customized: Option<PlannedVmid>,
}

impl PlanEntry {
    fn blocked(&self) -> bool {
        let abort = |p: &PlannedVmid| p.decision.as_ref().is_some_and(LifecycleDecision::is_abort);
        abort(&self.base) || self.customized.as_ref().is_some_and(abort)
    }
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, output: &OutputConfig) -> Result<()> {
    let loaded = args.config.load()?;
    let settings = &loaded.settings;

    let host = args.check.then(|| {
        ProxmoxHost::new(
            settings.transport.clone(),
            GuestSettings::default(),
            Default::default(),
        )
    });
    let probe = |vmid: VmId| -> PlannedVmid {
        let decision = host.as_ref().map(|h| {
            let (decision, probe_error) = consult_guard(vmid, settings.rebuild, h);
            if let Some(e) = probe_error {
                log::warn!("Could not check VMID {}: {}", vmid, e);
            }
            decision
        });
        PlannedVmid { vmid, decision }
    };

    let entries: Vec<PlanEntry> = loaded
        .selection
        .iter()
        .map(|distro| {
            let plan = IdentifierPlan::new(settings.base, distro, settings.customize);
            PlanEntry {
                distro: distro.id().to_string(),
                display_name: distro.display_name().to_string(),
                base: probe(plan.base),
                customized: plan.customized.map(&probe),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        let base = settings.base.get();
        println!(
            "{} VMID base {} (reserved {}-{}) on {}",
            emoji(output, "\u{1F4CB}", "[PLAN]"),
            base,
            base,
            base + RESERVED_RANGE - 1,
            settings.transport
        );
        print!("{}", render_entries(&entries));
    }

    let blocked = entries.iter().filter(|e| e.blocked()).count();
    if blocked > 0 {
        anyhow::bail!(
            "{} of {} distributions would not be built; pass --rebuild to replace existing templates",
            blocked,
            entries.len()
        );
    }
    Ok(())
}

fn render_vmid(planned: &PlannedVmid) -> String {
    match &planned.decision {
        Some(decision) => format!("{} ({})", planned.vmid, decision),
        None => planned.vmid.to_string(),
    }
}

fn render_entries(entries: &[PlanEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<16} {:<28} CUSTOMIZED", "DISTRO", "NAME", "BASE");
    for entry in entries {
        let customized = entry
            .customized
            .as_ref()
            .map(render_vmid)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<12} {:<16} {:<28} {}",
            entry.distro,
            entry.display_name,
            render_vmid(&entry.base),
            customized
        );
    }
    out
}
