//! The per-distribution build pipeline.
//!
//! ## Overview
//!
//! Each selected distribution moves through these states:
//!
//! 1. `Pending` - selected, nothing computed yet
//! 2. `IdentifierResolved` - base (and customized) VMIDs allocated
//! 3. `LifecycleChecked` - the guard allowed every identifier, and any
//!    requested rebuild has destroyed the old templates
//! 4. `BaseTemplateCreated` - the cloud image is a template at the base VMID
//! 5. `CustomizationCompleted` - Packer produced the customized template
//! 6. `IntermediateCleaned` - the base template was removed after customization
//! 7. `Done`
//!
//! States 5 and 6 only occur when customization (and cleanup) are enabled.
//! A failure in any state ends that distribution; the report records the last
//! state reached together with the reason.

use serde::Serialize;
use std::fmt;

use crate::config::{CustomizeSettings, Settings};
use crate::error::ExternalToolError;
use crate::hypervisor::Hypervisor;
use crate::lifecycle::{self, LifecycleDecision};
use crate::vmid::{BaseVmid, VmId};

pub mod orchestrator;

/// What the orchestrator does after a distribution fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and build the remaining distributions.
    #[default]
    Continue,
    /// Stop; remaining distributions are reported as skipped.
    Halt,
}

/// Progress of one distribution through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistroState {
    Pending,
    IdentifierResolved,
    LifecycleChecked,
    BaseTemplateCreated,
    CustomizationCompleted,
    IntermediateCleaned,
    Done,
}

impl fmt::Display for DistroState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DistroState::Pending => "pending",
            DistroState::IdentifierResolved => "identifier resolved",
            DistroState::LifecycleChecked => "lifecycle checked",
            DistroState::BaseTemplateCreated => "base template created",
            DistroState::CustomizationCompleted => "customization completed",
            DistroState::IntermediateCleaned => "intermediate cleaned",
            DistroState::Done => "done",
        };
        f.write_str(label)
    }
}

/// Options that apply to every distribution of a run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub base: BaseVmid,
    pub storage_pool: String,
    pub rebuild: bool,
    /// Remove the base template once the customized one exists.
    pub cleanup: bool,
    pub failure_policy: FailurePolicy,
    /// Customization is enabled exactly when this is present.
    pub customization: Option<CustomizeSettings>,
}

impl BuildOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base: settings.base,
            storage_pool: settings.storage_pool.clone(),
            rebuild: settings.rebuild,
            cleanup: settings.cleanup,
            failure_policy: settings.failure_policy,
            customization: settings.customization.clone(),
        }
    }

    pub fn customize(&self) -> bool {
        self.customization.is_some()
    }
}

/// Consult the lifecycle guard for `vmid`, probing the hypervisor.
///
/// A probe that fails counts as "in use": the decision is `Abort` and the
/// probe error is returned alongside so callers can report it.
pub fn consult_guard(
    vmid: VmId,
    rebuild: bool,
    hypervisor: &dyn Hypervisor,
) -> (LifecycleDecision, Option<ExternalToolError>) {
    let mut probe_failure = None;
    let decision = lifecycle::decide(vmid, rebuild, || match hypervisor.vm_exists(vmid) {
        Ok(exists) => exists,
        Err(e) => {
            probe_failure = Some(e);
            true
        }
    });
    match probe_failure {
        Some(e) => (
            LifecycleDecision::Abort(format!("existence check failed: {}", e.tool)),
            Some(e),
        ),
        None => (decision, None),
    }
}
