//! # VM Identifier Allocation
//!
//! Every VMID this tool touches is derived from a single operator-chosen base
//! plus the distribution's catalog offset plus a fixed phase offset:
//!
//! ```text
//! vmid = base + descriptor.offset + phase_offset
//!        phase_offset = 0   (base template)
//!        phase_offset = 100 (customized template)
//! ```
//!
//! Catalog offsets are unique and confined to `1..=99`, so no two
//! `(distribution, phase)` pairs share a VMID for a given base. The operator
//! must keep the 200 identifiers above the base free of unrelated guests.
//!
//! ```
//! use pve_templates::catalog::Catalog;
//! use pve_templates::vmid::{allocate, BaseVmid, Phase};
//!
//! let catalog = Catalog::builtin();
//! let debian12 = catalog.get("debian12").unwrap();
//! let base = BaseVmid::new(800).unwrap();
//!
//! assert_eq!(allocate(base, debian12, Phase::Base).get(), 802);
//! assert_eq!(allocate(base, debian12, Phase::Customized).get(), 902);
//! ```

use serde::Serialize;
use std::fmt;

use crate::catalog::DistroDescriptor;
use crate::error::{Error, Result};

/// Distance between the base template and the customized template of the
/// same distribution.
pub const CUSTOMIZED_PHASE_OFFSET: u32 = 100;

/// Number of identifiers above the base that the allocator may hand out.
pub const RESERVED_RANGE: u32 = 2 * CUSTOMIZED_PHASE_OFFSET;

/// Highest VMID Proxmox VE accepts.
pub const MAX_VMID: u32 = 999_999_999;

/// A concrete virtual machine identifier on the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VmId(u32);

impl VmId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated base identifier.
///
/// Construction enforces `base > 0` and that the whole reserved range fits
/// below [`MAX_VMID`], which makes [`allocate`] total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BaseVmid(u32);

impl BaseVmid {
    pub fn new(base: u64) -> Result<Self> {
        if base == 0 {
            return Err(Error::InvalidBase {
                base,
                message: "the base must be greater than zero".to_string(),
            });
        }
        let out_of_range = || Error::InvalidBase {
            base,
            message: format!(
                "the {} identifiers reserved above the base must not exceed the maximum VMID {}",
                RESERVED_RANGE, MAX_VMID
            ),
        };
        base.checked_add(u64::from(RESERVED_RANGE) - 1)
            .filter(|highest| *highest <= u64::from(MAX_VMID))
            .ok_or_else(out_of_range)?;
        let base = u32::try_from(base).map_err(|_| out_of_range())?;
        Ok(Self(base))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BaseVmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which stage of the pipeline an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The freshly imported cloud image, converted to a template.
    Base,
    /// The template produced by Packer from a clone of the base template.
    Customized,
}

impl Phase {
    pub const fn offset(self) -> u32 {
        match self {
            Phase::Base => 0,
            Phase::Customized => CUSTOMIZED_PHASE_OFFSET,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Base => write!(f, "base"),
            Phase::Customized => write!(f, "customized"),
        }
    }
}

/// Derive the VMID for a distribution in a given phase.
pub fn allocate(base: BaseVmid, descriptor: &DistroDescriptor, phase: Phase) -> VmId {
    VmId(base.get() + descriptor.offset() + phase.offset())
}

/// The identifiers one distribution occupies for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierPlan {
    pub distro: String,
    pub base: VmId,
    /// Present only when customization is enabled.
    pub customized: Option<VmId>,
}

impl IdentifierPlan {
    pub fn new(base: BaseVmid, descriptor: &DistroDescriptor, customize: bool) -> Self {
        Self {
            distro: descriptor.id().to_string(),
            base: allocate(base, descriptor, Phase::Base),
            customized: customize.then(|| allocate(base, descriptor, Phase::Customized)),
        }
    }

    /// Identifiers in the order they are torn down on rebuild.
    ///
    /// The customized template is a clone of the base, so it goes first.
    pub fn teardown_order(&self) -> Vec<VmId> {
        self.customized
            .into_iter()
            .chain(std::iter::once(self.base))
            .collect()
    }
}
