//! Per-distribution results of a build run.

use serde::Serialize;
use std::fmt;

use crate::catalog::DistroDescriptor;
use crate::phases::DistroState;
use crate::vmid::{IdentifierPlan, VmId};

/// How a distribution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Done,
    /// `stage` is the last state the distribution reached.
    Failed { stage: DistroState, reason: String },
    /// Not attempted because an earlier failure halted the run.
    Skipped,
}

/// Result for one distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroOutcome {
    pub distro: String,
    pub display_name: String,
    pub base_vmid: VmId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customized_vmid: Option<VmId>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DistroOutcome {
    pub fn new(distro: &DistroDescriptor, plan: &IdentifierPlan, status: OutcomeStatus) -> Self {
        Self {
            distro: distro.id().to_string(),
            display_name: distro.display_name().to_string(),
            base_vmid: plan.base,
            customized_vmid: plan.customized,
            status,
            warnings: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

impl fmt::Display for DistroOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vmids = match self.customized_vmid {
            Some(custom) => format!("{} -> {}", self.base_vmid, custom),
            None => self.base_vmid.to_string(),
        };
        match &self.status {
            OutcomeStatus::Done => write!(f, "{} ({}): done", self.distro, vmids),
            OutcomeStatus::Skipped => write!(f, "{} ({}): skipped", self.distro, vmids),
            OutcomeStatus::Failed { stage, reason } => write!(
                f,
                "{} ({}): failed after {}: {}",
                self.distro, vmids, stage, reason
            ),
        }
    }
}

/// Outcomes of every selected distribution, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub outcomes: Vec<DistroOutcome>,
}

impl BuildReport {
    pub fn push(&mut self, outcome: DistroOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn get(&self, distro: &str) -> Option<&DistroOutcome> {
        self.outcomes.iter().find(|o| o.distro == distro)
    }

    /// True when every distribution finished.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(DistroOutcome::is_done)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DistroOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn done_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skipped)
            .count()
    }

    /// Process exit status for this report.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
