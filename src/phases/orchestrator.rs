//! Orchestrator for a complete build run
//!
//! Drives every selected distribution through the pipeline described in the
//! [parent module](super), one after another in id order, and collects a
//! [`BuildReport`]. Tool failures never abort the run by themselves; the
//! [`FailurePolicy`] decides whether later distributions are still built.

use log::{error, info, warn};

use super::{consult_guard, BuildOptions, DistroState, FailurePolicy};
use crate::catalog::DistroDescriptor;
use crate::error::{Error, Result};
use crate::hypervisor::{CustomizeRequest, Hypervisor};
use crate::lifecycle::LifecycleDecision;
use crate::report::{BuildReport, DistroOutcome, OutcomeStatus};
use crate::selection::ResolvedSelection;
use crate::suggestions;
use crate::vmid::{IdentifierPlan, Phase};

/// Build every distribution in `selection`.
pub fn run(
    selection: &ResolvedSelection,
    options: &BuildOptions,
    hypervisor: &dyn Hypervisor,
) -> BuildReport {
    run_with_progress(selection, options, hypervisor, |_, _| {})
}

/// Like [`run`], calling `progress` after every state transition.
pub fn run_with_progress<F>(
    selection: &ResolvedSelection,
    options: &BuildOptions,
    hypervisor: &dyn Hypervisor,
    mut progress: F,
) -> BuildReport
where
    F: FnMut(&str, DistroState),
{
    let mut report = BuildReport::default();
    let mut halted = false;

    for distro in selection.iter() {
        if halted {
            let plan = IdentifierPlan::new(options.base, distro, options.customize());
            info!("Skipping {}: an earlier distribution failed", distro.id());
            report.push(DistroOutcome::new(distro, &plan, OutcomeStatus::Skipped));
            continue;
        }

        let outcome = build_distro(distro, options, hypervisor, &mut progress);
        if outcome.is_failed() && options.failure_policy == FailurePolicy::Halt {
            halted = true;
        }
        report.push(outcome);
    }

    info!(
        "Build finished: {} done, {} failed, {} skipped",
        report.done_count(),
        report.failed().count(),
        report.skipped_count()
    );
    report
}

/// State and warnings of the distribution being built.
struct Tracker<'p> {
    distro: String,
    state: DistroState,
    warnings: Vec<String>,
    progress: &'p mut dyn FnMut(&str, DistroState),
}

impl Tracker<'_> {
    fn advance(&mut self, next: DistroState) {
        self.state = next;
        (self.progress)(&self.distro, next);
    }

    fn warn(&mut self, message: String) {
        warn!("{}: {}", self.distro, message);
        self.warnings.push(message);
    }
}

fn build_distro(
    distro: &DistroDescriptor,
    options: &BuildOptions,
    hypervisor: &dyn Hypervisor,
    progress: &mut dyn FnMut(&str, DistroState),
) -> DistroOutcome {
    let plan = IdentifierPlan::new(options.base, distro, options.customize());
    let mut tracker = Tracker {
        distro: distro.id().to_string(),
        state: DistroState::Pending,
        warnings: Vec::new(),
        progress,
    };
    tracker.advance(DistroState::IdentifierResolved);

    let status = match execute(distro, &plan, options, hypervisor, &mut tracker) {
        Ok(()) => OutcomeStatus::Done,
        Err(e) => {
            error!("{} failed after {}: {}", distro.id(), tracker.state, e);
            OutcomeStatus::Failed {
                stage: tracker.state,
                reason: failure_reason(&e),
            }
        }
    };

    let mut outcome = DistroOutcome::new(distro, &plan, status);
    outcome.warnings = tracker.warnings;
    outcome
}

fn execute(
    distro: &DistroDescriptor,
    plan: &IdentifierPlan,
    options: &BuildOptions,
    hypervisor: &dyn Hypervisor,
    tracker: &mut Tracker<'_>,
) -> Result<()> {
    check_lifecycle(distro, plan, options, hypervisor, tracker)?;
    tracker.advance(DistroState::LifecycleChecked);

    hypervisor.create_base_template(plan.base, distro, &options.storage_pool)?;
    tracker.advance(DistroState::BaseTemplateCreated);

    if let (Some(settings), Some(customized)) = (&options.customization, plan.customized) {
        let request = CustomizeRequest {
            vmid: customized,
            clone_source: plan.base,
            distro,
            storage_pool: &options.storage_pool,
            playbook: &settings.playbook,
            varfile: settings.varfile.as_deref(),
        };
        hypervisor.customize_template(&request)?;
        tracker.advance(DistroState::CustomizationCompleted);

        if options.cleanup {
            match hypervisor.destroy(plan.base) {
                Ok(()) => tracker.advance(DistroState::IntermediateCleaned),
                Err(e) => tracker.warn(format!(
                    "could not remove base template {}: {}",
                    plan.base, e
                )),
            }
        }
    }

    tracker.advance(DistroState::Done);
    info!("{} is ready", distro.id());
    Ok(())
}

/// Run the guard on every identifier, then tear down old templates if a
/// rebuild was requested.
///
/// Nothing is destroyed unless every identifier of the distribution passed.
fn check_lifecycle(
    distro: &DistroDescriptor,
    plan: &IdentifierPlan,
    options: &BuildOptions,
    hypervisor: &dyn Hypervisor,
    tracker: &mut Tracker<'_>,
) -> Result<()> {
    let mut targets = vec![(Phase::Base, plan.base)];
    if let Some(customized) = plan.customized {
        targets.push((Phase::Customized, customized));
    }

    let mut needs_destroy = false;
    for (phase, vmid) in targets {
        let (decision, probe_error) = consult_guard(vmid, options.rebuild, hypervisor);
        if let Some(e) = probe_error {
            return Err(e.into());
        }
        match decision {
            LifecycleDecision::Proceed => {}
            LifecycleDecision::ProceedAfterDestroy => needs_destroy = true,
            LifecycleDecision::Abort(_) => {
                return Err(Error::IdentifierInUse {
                    vmid,
                    distro: distro.id().to_string(),
                    phase,
                })
            }
        }
    }

    if needs_destroy {
        for vmid in plan.teardown_order() {
            if let Err(e) = hypervisor.destroy(vmid) {
                tracker.warn(format!("could not destroy VMID {}: {}", vmid, e));
            }
        }
    }
    Ok(())
}

fn failure_reason(error: &Error) -> String {
    match error {
        Error::IdentifierInUse { vmid, .. } => {
            format!("{}\n{}", error, suggestions::identifier_in_use(*vmid))
        }
        other => other.to_string(),
    }
}
