//! # Error Suggestions
//!
//! This module provides helper functions for generating helpful error
//! messages with hints and suggestions. Errors should tell operators what
//! went wrong AND how to fix it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pve_templates::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("Answerfile not found: {}", path.display());
//!
//! // Use:
//! return Err(suggestions::answerfile_not_found(path));
//! ```

use std::path::Path;

use crate::catalog::Catalog;
use crate::error::SelectionError;
use crate::vmid::VmId;

/// Generate an error for an explicitly requested answerfile that is missing.
pub fn answerfile_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Answerfile not found: {path}\n\n\
         hint: Answerfiles hold KEY=value lines such as BUILD=debian12 and VMID_BASE=800\n\
         hint: Omit --answerfile to use flags and PVE_TEMPLATES_* environment variables only",
        path = path.display()
    )
}

/// Generate an error for a selection that failed to resolve.
///
/// Lists every valid id and group so the operator can fix all tokens at once.
pub fn invalid_selection(error: &SelectionError, catalog: &Catalog) -> anyhow::Error {
    let ids: Vec<&str> = catalog.distros().map(|d| d.id()).collect();
    let groups: Vec<&str> = catalog
        .groups()
        .map(|g| g.name())
        .chain(std::iter::once(crate::catalog::ALL_GROUP))
        .collect();

    anyhow::anyhow!(
        "{error}\n\n\
         Valid distributions are: {ids}\n\
         Valid groups are: {groups}\n\
         hint: Run 'pve-templates list' to see the catalog",
        ids = ids.join(", "),
        groups = groups.join(", ")
    )
}

/// Hint attached to an identifier conflict in the build report.
pub fn identifier_in_use(vmid: VmId) -> String {
    format!(
        "hint: Pass --rebuild to destroy and recreate VMID {vmid}\n\
         hint: Or choose a --vmid-base whose 200 identifiers are free"
    )
}

/// Generate an error for a missing host tool.
pub fn missing_tool(tool: &str, package: &str, reason: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Required tool not found: {tool} (needed {reason})\n\n\
         hint: Install the '{package}' package on this machine\n\
         hint: Use --skip-preflight if the tool lives outside PATH"
    )
}

/// Suggest the closest known token, if any is close enough.
pub fn did_you_mean(input: &str, candidates: &[&str]) -> Option<String> {
    find_similar(input, candidates).map(|s| format!("Did you mean '{s}'?"))
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Single rolling row instead of the full matrix.
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
