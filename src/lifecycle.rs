//! # Lifecycle Guard
//!
//! Decides whether a target VMID may be used. The guard performs no I/O: the
//! caller supplies an existence probe, normally backed by
//! [`Hypervisor::vm_exists`](crate::hypervisor::Hypervisor::vm_exists).
//!
//! | rebuild | probe  | decision              |
//! |---------|--------|-----------------------|
//! | true    | unused | `ProceedAfterDestroy` |
//! | false   | true   | `Abort`               |
//! | false   | false  | `Proceed`             |
//!
//! With rebuild requested the probe is never called; destroying an absent VM
//! is a no-op at the hypervisor layer.

use serde::Serialize;
use std::fmt;

use crate::vmid::VmId;

/// Reason attached to an abort caused by an existing VM.
pub const IN_USE_REASON: &str = "identifier already in use";

/// Outcome of consulting the guard for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum LifecycleDecision {
    /// The identifier is free.
    Proceed,
    /// The caller must destroy the identifier before creating it.
    ProceedAfterDestroy,
    /// The identifier must not be touched.
    Abort(String),
}

impl LifecycleDecision {
    pub fn is_abort(&self) -> bool {
        matches!(self, LifecycleDecision::Abort(_))
    }

    pub fn requires_destroy(&self) -> bool {
        matches!(self, LifecycleDecision::ProceedAfterDestroy)
    }
}

impl fmt::Display for LifecycleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleDecision::Proceed => write!(f, "proceed"),
            LifecycleDecision::ProceedAfterDestroy => write!(f, "destroy, then proceed"),
            LifecycleDecision::Abort(reason) => write!(f, "abort ({reason})"),
        }
    }
}

/// Decide what may happen to `vmid`.
pub fn decide<P>(vmid: VmId, rebuild_requested: bool, existence_probe: P) -> LifecycleDecision
where
    P: FnOnce() -> bool,
{
    if rebuild_requested {
        log::debug!("VMID {vmid}: rebuild requested, existence not checked");
        return LifecycleDecision::ProceedAfterDestroy;
    }
    if existence_probe() {
        log::debug!("VMID {vmid}: already exists");
        LifecycleDecision::Abort(IN_USE_REASON.to_string())
    } else {
        LifecycleDecision::Proceed
    }
}
