//! # Distribution Catalog
//!
//! The catalog is the static table of distributions this tool knows how to
//! build, plus the named groups an operator may select them by. It is loaded
//! once at startup (either the built-in table or a YAML file) and is read-only
//! for the rest of the process.
//!
//! ## Invariants
//!
//! Every catalog, built-in or loaded, satisfies:
//!
//! - ids are unique and match `^[a-z][a-z0-9]*$`
//! - offsets are unique and lie in `1..=99`, so base and customized
//!   identifiers of different distributions can never collide
//! - every source locator is an absolute URL
//! - group members exist, and no group is named `all` or after a distribution
//!
//! ## File format
//!
//! ```yaml
//! distros:
//!   - id: debian12
//!     display_name: Debian-12
//!     offset: 2
//!     source: https://cloud.debian.org/images/cloud/bookworm/latest/debian-12-genericcloud-amd64.qcow2
//! groups:
//!   debian: [debian12]
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::CatalogError;

/// Reserved group name that always expands to every catalog id.
pub const ALL_GROUP: &str = "all";

/// Offsets must stay below the customized phase offset.
const OFFSET_RANGE: std::ops::RangeInclusive<u32> = 1..=99;

/// A distribution the tool can turn into a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroDescriptor {
    id: String,
    display_name: String,
    offset: u32,
    source: String,
}

impl DistroDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        offset: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            offset,
            source: source.into(),
        }
    }

    /// Short token such as `debian12`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human label such as `Debian-12`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// URL of the cloud image.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// File name the downloaded image is stored under.
    pub fn image_file_name(&self) -> String {
        url::Url::parse(&self.source)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}.img", self.id))
    }
}

/// A named alias for a set of distribution ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    name: String,
    members: BTreeSet<String>,
}

impl Group {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }
}

/// The process-wide, read-only table of distributions and groups.
#[derive(Debug, Clone)]
pub struct Catalog {
    distros: BTreeMap<String, DistroDescriptor>,
    groups: BTreeMap<String, Group>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    distros: Vec<DistroDescriptor>,
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*$").expect("static pattern is valid"))
}

impl Catalog {
    /// Build a catalog from descriptors and groups, enforcing every invariant.
    pub fn new(
        distros: Vec<DistroDescriptor>,
        groups: Vec<Group>,
    ) -> Result<Self, CatalogError> {
        if distros.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_id: BTreeMap<String, DistroDescriptor> = BTreeMap::new();
        let mut by_offset: BTreeMap<u32, String> = BTreeMap::new();

        for distro in distros {
            if !id_pattern().is_match(&distro.id) {
                return Err(CatalogError::InvalidId { id: distro.id });
            }
            if !OFFSET_RANGE.contains(&distro.offset) {
                return Err(CatalogError::OffsetOutOfRange {
                    id: distro.id,
                    offset: distro.offset,
                });
            }
            match url::Url::parse(&distro.source) {
                Ok(parsed) if parsed.has_host() => {}
                Ok(_) => {
                    return Err(CatalogError::InvalidSource {
                        id: distro.id,
                        message: "URL has no host".to_string(),
                    })
                }
                Err(e) => {
                    return Err(CatalogError::InvalidSource {
                        id: distro.id,
                        message: e.to_string(),
                    })
                }
            }
            if let Some(first) = by_offset.get(&distro.offset) {
                return Err(CatalogError::DuplicateOffset {
                    offset: distro.offset,
                    first: first.clone(),
                    second: distro.id,
                });
            }
            if by_id.contains_key(&distro.id) {
                return Err(CatalogError::DuplicateId { id: distro.id });
            }
            by_offset.insert(distro.offset, distro.id.clone());
            by_id.insert(distro.id.clone(), distro);
        }

        let mut by_name: BTreeMap<String, Group> = BTreeMap::new();
        for group in groups {
            if group.name == ALL_GROUP
                || by_id.contains_key(&group.name)
                || !id_pattern().is_match(&group.name)
            {
                return Err(CatalogError::ReservedGroupName { name: group.name });
            }
            if let Some(member) = group.members.iter().find(|m| !by_id.contains_key(*m)) {
                return Err(CatalogError::UnknownGroupMember {
                    group: group.name.clone(),
                    member: member.clone(),
                });
            }
            // Repeated group names merge, so a file can declare a group in pieces.
            by_name
                .entry(group.name.clone())
                .and_modify(|existing| existing.members.extend(group.members.iter().cloned()))
                .or_insert(group);
        }

        Ok(Self {
            distros: by_id,
            groups: by_name,
        })
    }

    /// The catalog shipped with the tool.
    pub fn builtin() -> Self {
        let distros = builtin_distros()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let groups = builtin_groups()
            .into_iter()
            .map(|g| (g.name.clone(), g))
            .collect();
        Self { distros, groups }
    }

    /// Parse and validate a YAML catalog.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let groups = file
            .groups
            .into_iter()
            .map(|(name, members)| Group::new(name, members))
            .collect();
        Self::new(file.distros, groups)
    }

    /// Read, parse and validate a YAML catalog file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load the catalog from `path`, or fall back to the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DistroDescriptor> {
        self.distros.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.distros.contains_key(id)
    }

    /// Distributions in id order.
    pub fn distros(&self) -> impl Iterator<Item = &DistroDescriptor> {
        self.distros.values()
    }

    /// Declared groups in name order. `all` is implicit and not listed.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Look up a group by name, treating `all` as the whole catalog.
    pub fn group_members(&self, name: &str) -> Option<BTreeSet<String>> {
        if name == ALL_GROUP {
            return Some(self.all_ids());
        }
        self.groups.get(name).map(|g| g.members.clone())
    }

    pub fn all_ids(&self) -> BTreeSet<String> {
        self.distros.keys().cloned().collect()
    }

    /// Every token a selection may use: ids, group names and `all`.
    pub fn known_tokens(&self) -> Vec<&str> {
        self.distros
            .keys()
            .map(String::as_str)
            .chain(self.groups.keys().map(String::as_str))
            .chain(std::iter::once(ALL_GROUP))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.distros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distros.is_empty()
    }

    /// Descriptors and groups as plain values, for rebuilding or inspection.
    pub fn into_parts(self) -> (Vec<DistroDescriptor>, Vec<Group>) {
        (
            self.distros.into_values().collect(),
            self.groups.into_values().collect(),
        )
    }
}

fn builtin_distros() -> Vec<DistroDescriptor> {
    vec![
        DistroDescriptor::new(
            "debian11",
            "Debian-11",
            1,
            "https://cloud.debian.org/images/cloud/bullseye/latest/debian-11-genericcloud-amd64.qcow2",
        ),
        DistroDescriptor::new(
            "debian12",
            "Debian-12",
            2,
            "https://cloud.debian.org/images/cloud/bookworm/latest/debian-12-genericcloud-amd64.qcow2",
        ),
        DistroDescriptor::new(
            "debian13",
            "Debian-13",
            3,
            "https://cloud.debian.org/images/cloud/trixie/latest/debian-13-genericcloud-amd64.qcow2",
        ),
        DistroDescriptor::new(
            "ubuntu2204",
            "Ubuntu-22.04",
            11,
            "https://cloud-images.ubuntu.com/jammy/current/jammy-server-cloudimg-amd64.img",
        ),
        DistroDescriptor::new(
            "ubuntu2404",
            "Ubuntu-24.04",
            12,
            "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img",
        ),
        DistroDescriptor::new(
            "fedora41",
            "Fedora-41",
            21,
            "https://download.fedoraproject.org/pub/fedora/linux/releases/41/Cloud/x86_64/images/Fedora-Cloud-Base-Generic-41-1.4.x86_64.qcow2",
        ),
        DistroDescriptor::new(
            "fedora42",
            "Fedora-42",
            22,
            "https://download.fedoraproject.org/pub/fedora/linux/releases/42/Cloud/x86_64/images/Fedora-Cloud-Base-Generic-42-1.1.x86_64.qcow2",
        ),
        DistroDescriptor::new(
            "rocky9",
            "Rocky-9",
            31,
            "https://dl.rockylinux.org/pub/rocky/9/images/x86_64/Rocky-9-GenericCloud-Base.latest.x86_64.qcow2",
        ),
        DistroDescriptor::new(
            "alma9",
            "AlmaLinux-9",
            41,
            "https://repo.almalinux.org/almalinux/9/cloud/x86_64/images/AlmaLinux-9-GenericCloud-latest.x86_64.qcow2",
        ),
        DistroDescriptor::new(
            "centos9",
            "CentOS-Stream-9",
            51,
            "https://cloud.centos.org/centos/9-stream/x86_64/images/CentOS-Stream-GenericCloud-9-latest.x86_64.qcow2",
        ),
    ]
}

fn builtin_groups() -> Vec<Group> {
    vec![
        Group::new("debian", ["debian11", "debian12", "debian13"]),
        Group::new("ubuntu", ["ubuntu2204", "ubuntu2404"]),
        Group::new("fedora", ["fedora41", "fedora42"]),
        Group::new("rocky", ["rocky9"]),
        Group::new("alma", ["alma9"]),
        Group::new("centos", ["centos9"]),
        Group::new("el", ["rocky9", "alma9", "centos9"]),
    ]
}
