//! # List Command Implementation
//!
//! This module implements the `list` subcommand, which prints the catalog:
//! every distribution with the VMIDs it gets for a base, followed by the
//! groups usable in a selection.
//!
//! `--tree` shows groups as a tree of their members instead.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::PathBuf;

use pve_templates::catalog::{Catalog, ALL_GROUP};
use pve_templates::defaults::DEFAULT_VMID_BASE;
use pve_templates::vmid::{allocate, BaseVmid, Phase};

/// List supported distributions and groups
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Base used to compute the VMID columns
    #[arg(long, value_name = "N", env = "PVE_TEMPLATES_VMID_BASE", default_value_t = DEFAULT_VMID_BASE)]
    pub vmid_base: u64,

    /// YAML catalog replacing the built-in distributions
    #[arg(long, value_name = "FILE", env = "PVE_TEMPLATES_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Show groups as a tree
    #[arg(long)]
    pub tree: bool,
}

/// Execute the `list` command.
pub fn execute(args: ListArgs) -> Result<()> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    let base = BaseVmid::new(args.vmid_base)?;

    if args.tree {
        print_tree(&group_tree(&catalog))
            .map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    } else {
        print!("{}", render_table(&catalog, base));
    }
    Ok(())
}

fn render_table(catalog: &Catalog, base: BaseVmid) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<16} {:>10} {:>10}",
        "ID", "NAME", "BASE", "CUSTOMIZED"
    );
    for distro in catalog.distros() {
        let _ = writeln!(
            out,
            "{:<12} {:<16} {:>10} {:>10}",
            distro.id(),
            distro.display_name(),
            allocate(base, distro, Phase::Base),
            allocate(base, distro, Phase::Customized)
        );
    }

    let _ = writeln!(out, "\nGroups:");
    for group in catalog.groups() {
        let members: Vec<&str> = group.members().iter().map(String::as_str).collect();
        let _ = writeln!(out, "  {:<10} {}", group.name(), members.join(", "));
    }
    let _ = writeln!(out, "  {:<10} every distribution", ALL_GROUP);
    out
}

fn group_tree(catalog: &Catalog) -> TreeNode {
    let groups = catalog
        .groups()
        .map(|group| TreeNode {
            label: group.name().to_string(),
            children: group
                .members()
                .iter()
                .map(|id| TreeNode::leaf(catalog, id))
                .collect(),
        })
        .collect();
    TreeNode {
        label: ALL_GROUP.to_string(),
        children: groups,
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(catalog: &Catalog, id: &str) -> Self {
        let label = match catalog.get(id) {
            Some(distro) => format!("{} ({})", id, distro.display_name()),
            None => id.to_string(),
        };
        Self {
            label,
            children: Vec::new(),
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_every_distro_with_vmids() {
        let catalog = Catalog::builtin();
        let text = render_table(&catalog, BaseVmid::new(800).unwrap());
        let debian = text.lines().find(|l| l.starts_with("debian12")).unwrap();
        assert!(debian.contains("802"));
        assert!(debian.contains("902"));
        assert!(text.contains("Groups:"));
        assert!(text.contains("el         alma9, centos9, rocky9"));
        assert_eq!(text.lines().filter(|l| l.contains("-")).count(), 10);
    }

    #[test]
    fn test_group_tree_shape() {
        let catalog = Catalog::builtin();
        let tree = group_tree(&catalog);
        assert_eq!(tree.label, "all");
        let el = tree.children.iter().find(|c| c.label == "el").unwrap();
        let labels: Vec<&str> = el.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["alma9 (AlmaLinux-9)", "centos9 (CentOS-Stream-9)", "rocky9 (Rocky-9)"]);
    }
}
