//! Property-based tests for hash tree invariants.
//!
//! These verify the behavioral contracts the rest of the cache depends on:
//! - Root hashes are independent of resource insertion order
//! - Copy-on-write derivation never mutates the base tree
//! - Removing every resource restores the empty-tree hash

use buildcache_tree::{HashTree, ResourceInput, ResourceMeta};
use proptest::prelude::*;

fn resource_path_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}".prop_map(|s| format!("/{s}.js"))
}

fn integrity_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{8}".prop_map(|s| format!("sha256-{s}"))
}

fn resource_set_strategy(max_len: usize) -> impl Strategy<Value = Vec<ResourceInput>> {
    proptest::collection::vec((resource_path_strategy(), integrity_strategy()), 0..=max_len)
        .prop_map(|pairs| {
            let mut seen = std::collections::HashSet::new();
            pairs
                .into_iter()
                .filter(|(path, _)| seen.insert(path.clone()))
                .map(|(path, integrity)| ResourceInput {
                    path,
                    meta: ResourceMeta {
                        integrity,
                        last_modified: None,
                        size: None,
                        inode: None,
                    },
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn build_root_hash_ignores_insertion_order(resources in resource_set_strategy(12), seed in 0u64..1000) {
        let mut shuffled = resources.clone();
        // deterministic pseudo-shuffle so the test stays reproducible without relying on Math.random-equivalents
        shuffled.sort_by_key(|r| {
            let mut h = seed;
            for b in r.path.as_bytes() {
                h = h.wrapping_mul(31).wrapping_add(u64::from(*b));
            }
            h
        });

        let t1 = HashTree::build(&resources).unwrap();
        let t2 = HashTree::build(&shuffled).unwrap();
        prop_assert_eq!(t1.root_hash(), t2.root_hash());
    }

    #[test]
    fn derive_tree_never_changes_base_hash(base_resources in resource_set_strategy(8), extra in resource_set_strategy(4)) {
        let base = HashTree::build(&base_resources).unwrap();
        let base_hash = base.root_hash();
        let _derived = base.derive_tree(&extra).unwrap();
        prop_assert_eq!(base.root_hash(), base_hash);
    }

    #[test]
    fn removing_all_resources_restores_empty_hash(resources in resource_set_strategy(10)) {
        let mut tree = HashTree::build(&resources).unwrap();
        let paths: Vec<String> = resources.iter().map(|r| r.path.clone()).collect();
        tree.remove_resources(&paths).unwrap();
        prop_assert_eq!(tree.root_hash(), HashTree::empty().root_hash());
    }

    #[test]
    fn single_upsert_matches_equivalent_batch(resources in resource_set_strategy(6)) {
        let mut sequential = HashTree::empty();
        for r in &resources {
            sequential.upsert_resources(std::slice::from_ref(r), None).unwrap();
        }
        let batch = HashTree::build(&resources).unwrap();
        prop_assert_eq!(sequential.root_hash(), batch.root_hash());
    }
}
