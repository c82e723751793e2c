//! # Proxmox VE Template Builder Library
//!
//! This library builds virtual machine templates on a Proxmox VE node from
//! upstream cloud images, optionally customizing them with Packer and Ansible.
//! It is designed to be used by the `pve-templates` command-line tool but can
//! also drive builds from other programs, with any implementation of
//! [`hypervisor::Hypervisor`].
//!
//! ## Quick Example
//!
//! ```
//! use pve_templates::catalog::Catalog;
//! use pve_templates::selection;
//! use pve_templates::vmid::{allocate, BaseVmid, Phase};
//!
//! let catalog = Catalog::builtin();
//! let selected = selection::resolve("debian,ubuntu2404", &catalog).unwrap();
//! assert_eq!(selected.ids(), vec!["debian11", "debian12", "debian13", "ubuntu2404"]);
//!
//! let base = BaseVmid::new(800).unwrap();
//! let ubuntu = catalog.get("ubuntu2404").unwrap();
//! assert_eq!(allocate(base, ubuntu, Phase::Customized).get(), 912);
//! ```
//!
//! ## Core Concepts
//!
//! - **Catalog (`catalog`)**: Supported distributions with their VMID offsets
//!   and image URLs, plus named groups such as `debian` or `el`.
//! - **Selection (`selection`)**: Turns `"debian,ubuntu2404"` into a sorted,
//!   de-duplicated set of distributions, rejecting unknown tokens.
//! - **Identifiers (`vmid`)**: Derives every VMID from one base.
//! - **Lifecycle guard (`lifecycle`)**: Refuses to overwrite existing VMs
//!   unless a rebuild was requested.
//! - **Hypervisor (`hypervisor`, `transport`)**: The four operations the
//!   build needs, implemented with `qm`, `curl` and `packer`, locally or
//!   over SSH.
//! - **Phases (`phases`)**: The per-distribution state machine and the
//!   orchestrator that produces a [`report::BuildReport`].
//!
//! ## Execution Flow
//!
//! For every selected distribution, in id order:
//!
//! 1.  **Allocate** the base VMID and, when customizing, the customized VMID.
//! 2.  **Guard** each identifier; destroy old templates first on rebuild.
//! 3.  **Create** the base template from the cloud image.
//! 4.  **Customize** a clone of it with Packer (optional).
//! 5.  **Clean up** the base template (optional).
//!
//! A failed distribution does not stop the others unless the run halts on
//! error; the report lists every outcome.

pub mod catalog;
pub mod config;
pub mod defaults;
pub mod error;
pub mod hypervisor;
pub mod lifecycle;
pub mod output;
pub mod phases;
pub mod preflight;
pub mod report;
pub mod selection;
pub mod suggestions;
pub mod transport;
pub mod vmid;

#[cfg(test)]
mod selection_proptest;
