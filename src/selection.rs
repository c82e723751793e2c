//! # Selection Resolution
//!
//! Turns the operator's selection expression into the set of distributions to
//! build. An expression is a comma separated list of tokens; each token is,
//! in order of precedence:
//!
//! 1. an exact catalog id (`debian12`)
//! 2. an exact group name (`debian`, or the reserved `all`)
//! 3. unrecognized
//!
//! Group tokens expand to their members and the result is the deduplicated
//! union. Unrecognized tokens fail the whole resolution, and every one of
//! them is reported. An empty expression means `all`.
//!
//! Resolution is pure: the result is a set, and its iteration order is always
//! sorted by id no matter how the catalog stores its entries.
//!
//! ```
//! use pve_templates::catalog::Catalog;
//! use pve_templates::selection::resolve;
//!
//! let catalog = Catalog::builtin();
//! let selection = resolve("debian,debian11", &catalog).unwrap();
//! assert_eq!(selection.ids(), vec!["debian11", "debian12", "debian13"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::catalog::{Catalog, DistroDescriptor, ALL_GROUP};
use crate::error::SelectionError;
use crate::suggestions;

/// A non-empty, deduplicated set of catalog distributions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    distros: BTreeMap<String, DistroDescriptor>,
}

impl ResolvedSelection {
    /// Selected ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.distros.keys().map(String::as_str).collect()
    }

    /// Selected descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &DistroDescriptor> {
        self.distros.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.distros.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.distros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distros.is_empty()
    }
}

impl fmt::Display for ResolvedSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ids().join(", "))
    }
}

/// Split a raw expression into tokens, tolerating stray whitespace.
fn tokenize(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Resolve a selection expression against the catalog.
pub fn resolve(raw: &str, catalog: &Catalog) -> Result<ResolvedSelection, SelectionError> {
    let mut tokens = tokenize(raw);
    if tokens.is_empty() {
        tokens.push(ALL_GROUP);
    }

    let mut selected: BTreeSet<String> = BTreeSet::new();
    let mut unknown: BTreeSet<String> = BTreeSet::new();

    for token in tokens {
        if catalog.contains(token) {
            selected.insert(token.to_string());
        } else if let Some(members) = catalog.group_members(token) {
            selected.extend(members);
        } else {
            unknown.insert(token.to_string());
        }
    }

    if !unknown.is_empty() {
        let known = catalog.known_tokens();
        let hints = unknown
            .iter()
            .filter_map(|token| suggestions::did_you_mean(token, &known))
            .collect();
        return Err(SelectionError::UnknownToken {
            tokens: unknown.into_iter().collect(),
            hints,
        });
    }

    let distros: BTreeMap<String, DistroDescriptor> = selected
        .into_iter()
        .filter_map(|id| catalog.get(&id).map(|d| (id, d.clone())))
        .collect();

    if distros.is_empty() {
        return Err(SelectionError::EmptySelection);
    }

    Ok(ResolvedSelection { distros })
}
