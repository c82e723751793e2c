//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `pve-templates` library. It uses the `thiserror` library to create a small
//! family of error enums, one per failure domain, and a crate-wide `Error`
//! that wraps them.
//!
//! ## Key Components
//!
//! - **`SelectionError`**: The operator's distribution selection could not be
//!   resolved. Always raised before any infrastructure action.
//! - **`CatalogError`**: A catalog file failed to load or validate.
//! - **`ExternalToolError`**: A `qm`, `curl`, `packer` or `ssh` invocation
//!   failed. Always attributed to a distribution and phase by the orchestrator.
//! - **`Error`**: The crate-wide error, which also carries per-distribution
//!   identifier conflicts and configuration problems.
//!
//! Destroy failures deliberately do not have an `Error` path of their own in
//! the orchestrator: they are logged and recorded as report warnings.

use thiserror::Error;

use crate::vmid::{Phase, VmId};

/// Failure to turn a raw selection string into a set of distributions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// One or more tokens matched neither a catalog id nor a group name.
    ///
    /// `tokens` lists every unrecognized token, sorted, so an operator can fix
    /// all typos in one pass. `hints` holds "did you mean" suggestions.
    #[error("Unknown distribution or group: {}{}", tokens.join(", "), format_hints(hints))]
    UnknownToken {
        tokens: Vec<String>,
        hints: Vec<String>,
    },

    /// The selection expanded to no distributions at all.
    #[error("Selection resolved to no distributions")]
    EmptySelection,
}

fn format_hints(hints: &[String]) -> String {
    hints
        .iter()
        .map(|h| format!("\n  hint: {}", h))
        .collect::<String>()
}

/// A catalog definition that violates the catalog invariants.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicate distribution id in catalog: {id}")]
    DuplicateId { id: String },

    #[error("Offset {offset} is used by both {first} and {second}")]
    DuplicateOffset {
        offset: u32,
        first: String,
        second: String,
    },

    #[error("Offset {offset} for {id} is outside 1..=99")]
    OffsetOutOfRange { id: String, offset: u32 },

    #[error("Invalid distribution id '{id}': ids are lowercase letters followed by letters or digits")]
    InvalidId { id: String },

    #[error("Invalid source URL for {id}: {message}")]
    InvalidSource { id: String, message: String },

    #[error("Group '{group}' references unknown distribution '{member}'")]
    UnknownGroupMember { group: String, member: String },

    #[error("Group name '{name}' is reserved or collides with a distribution id")]
    ReservedGroupName { name: String },

    #[error("Catalog defines no distributions")]
    Empty,

    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A failed invocation of an external tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{tool} failed{}: {command}{}", format_status(*status), format_stderr(stderr))]
pub struct ExternalToolError {
    /// Program name, e.g. `qm` or `packer`.
    pub tool: String,
    /// The full command line as it was executed.
    pub command: String,
    /// Exit status, `None` when the process could not be spawned or was killed.
    pub status: Option<i32>,
    /// Captured standard error (or the spawn error message).
    pub stderr: String,
}

fn format_status(status: Option<i32>) -> String {
    status
        .map(|s| format!(" with exit status {}", s))
        .unwrap_or_default()
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n  {}", trimmed)
    }
}

/// Main error type for pve-templates operations
#[derive(Error, Debug)]
pub enum Error {
    /// The selection string could not be resolved.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The catalog is invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// An external tool failed.
    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),

    /// A target identifier is already in use and rebuild was not requested.
    #[error("VMID {vmid} ({phase} template of {distro}) is already in use")]
    IdentifierInUse {
        vmid: VmId,
        distro: String,
        phase: Phase,
    },

    /// The base identifier violates the allocation preconditions.
    #[error("Invalid VMID base {base}: {message}")]
    InvalidBase { base: u64, message: String },

    /// A configuration value is missing or malformed.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
