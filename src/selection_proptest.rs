//! Property-based tests for selection resolution and identifier allocation.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::catalog::{Catalog, Group, ALL_GROUP};
    use crate::selection::resolve;
    use crate::vmid::{allocate, BaseVmid, Phase, CUSTOMIZED_PHASE_OFFSET, MAX_VMID, RESERVED_RANGE};
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashSet};

    fn builtin_tokens() -> Vec<String> {
        Catalog::builtin()
            .known_tokens()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn valid_base() -> impl Strategy<Value = u64> {
        1..=u64::from(MAX_VMID - RESERVED_RANGE + 1)
    }

    // ============================================================================
    // Selection properties
    // ============================================================================

    proptest! {
        /// Property: "all" yields every catalog id no matter how the catalog
        /// was assembled
        #[test]
        fn all_is_independent_of_catalog_order(
            (distros, groups) in {
                let (d, g) = Catalog::builtin().into_parts();
                (Just(d).prop_shuffle(), Just(g).prop_shuffle())
            }
        ) {
            let expected = Catalog::builtin().all_ids();
            let catalog = Catalog::new(distros, groups).unwrap();
            let resolved = resolve(ALL_GROUP, &catalog).unwrap();
            let ids: BTreeSet<String> = resolved.ids().into_iter().map(str::to_string).collect();
            prop_assert_eq!(ids, expected);
        }

        /// Property: a group resolves to exactly its declared members
        #[test]
        fn group_resolves_to_declared_members(index in any::<prop::sample::Index>()) {
            let catalog = Catalog::builtin();
            let groups: Vec<&Group> = catalog.groups().collect();
            let group = index.get(&groups);
            let resolved = resolve(group.name(), &catalog).unwrap();
            let ids: BTreeSet<String> = resolved.ids().into_iter().map(str::to_string).collect();
            prop_assert_eq!(&ids, group.members());
        }

        /// Property: resolving several tokens equals the union of resolving
        /// each one, so overlapping tokens never add duplicates
        #[test]
        fn resolution_is_union_of_tokens(
            tokens in prop::sample::subsequence(builtin_tokens(), 1..6),
            repeat in any::<bool>()
        ) {
            let catalog = Catalog::builtin();
            let mut expression = tokens.clone();
            if repeat {
                expression.extend(tokens.iter().cloned());
            }

            let combined = resolve(&expression.join(","), &catalog).unwrap();
            let mut union = BTreeSet::new();
            for token in &tokens {
                for id in resolve(token, &catalog).unwrap().ids() {
                    union.insert(id.to_string());
                }
            }
            let ids: BTreeSet<String> = combined.ids().into_iter().map(str::to_string).collect();
            prop_assert_eq!(combined.len(), union.len());
            prop_assert_eq!(ids, union);
        }

        /// Property: unknown tokens are never silently dropped
        #[test]
        fn unknown_token_always_fails(token in "[a-z]{1,12}") {
            let catalog = Catalog::builtin();
            prop_assume!(!builtin_tokens().contains(&token));
            let expression = format!("debian12,{}", token);
            prop_assert!(resolve(&expression, &catalog).is_err());
        }
    }

    // ============================================================================
    // Allocation properties
    // ============================================================================

    proptest! {
        /// Property: allocation is base + offset (+ 100 when customized)
        #[test]
        fn allocation_is_deterministic(base in valid_base(), index in any::<prop::sample::Index>()) {
            let catalog = Catalog::builtin();
            let distros: Vec<_> = catalog.distros().collect();
            let distro = index.get(&distros);
            let validated = BaseVmid::new(base).unwrap();

            let expected = u32::try_from(base).unwrap() + distro.offset();
            prop_assert_eq!(allocate(validated, distro, Phase::Base).get(), expected);
            prop_assert_eq!(
                allocate(validated, distro, Phase::Customized).get(),
                expected + CUSTOMIZED_PHASE_OFFSET
            );
        }

        /// Property: no two (distribution, phase) pairs share an identifier
        #[test]
        fn allocation_never_collides(base in valid_base()) {
            let catalog = Catalog::builtin();
            let validated = BaseVmid::new(base).unwrap();
            let mut seen = HashSet::new();
            for distro in catalog.distros() {
                for phase in [Phase::Base, Phase::Customized] {
                    let vmid = allocate(validated, distro, phase);
                    prop_assert!(
                        seen.insert(vmid),
                        "{} {} collides at {}",
                        distro.id(),
                        phase,
                        vmid
                    );
                    prop_assert!(vmid.get() <= MAX_VMID);
                }
            }
        }
    }
}
