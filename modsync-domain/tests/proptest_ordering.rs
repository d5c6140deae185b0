//! Property-based tests for deterministic module ordering.
//!
//! These tests verify that:
//! - Every dependency is applied before its dependents
//! - The order does not depend on manifest input order
//! - Install/update intent reaches every transitive dependent

use modsync_domain::{UpdateRequest, resolve};
use modsync_types::manifest::Manifest;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Strategy for an acyclic module set: module `i` may only depend on modules `< i`.
fn arb_dag() -> impl Strategy<Value = Vec<Manifest>> {
    (1usize..12).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::btree_set(0usize..n, 0..4), n).prop_map(
            move |deps| {
                deps.into_iter()
                    .enumerate()
                    .map(|(i, ds)| {
                        Manifest::new(format!("m{i:02}"))
                            .with_depends(ds.into_iter().filter(|d| *d < i).map(|d| format!("m{d:02}")))
                    })
                    .collect()
            },
        )
    })
}

fn order(manifests: &[Manifest], request: &UpdateRequest) -> Vec<String> {
    resolve(manifests, request)
        .unwrap()
        .order()
        .into_iter()
        .map(|n| n.name.clone())
        .collect()
}

proptest! {
    #[test]
    fn dependencies_precede_dependents(manifests in arb_dag()) {
        let names = order(&manifests, &UpdateRequest::default());
        let position: BTreeMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

        prop_assert_eq!(names.len(), manifests.len());
        for m in &manifests {
            for dep in &m.depends {
                prop_assert!(position[dep.as_str()] < position[m.name.as_str()]);
            }
        }
    }

    #[test]
    fn order_independent_of_input_order(manifests in arb_dag()) {
        let forward = order(&manifests, &UpdateRequest::default());
        let mut reversed = manifests.clone();
        reversed.reverse();
        prop_assert_eq!(forward, order(&reversed, &UpdateRequest::default()));
    }

    #[test]
    fn install_reaches_all_dependents(manifests in arb_dag(), pick in any::<prop::sample::Index>()) {
        let target = manifests[pick.index(manifests.len())].name.clone();
        let request = UpdateRequest {
            install: BTreeSet::from([target.clone()]),
            ..Default::default()
        };
        let graph = resolve(&manifests, &request).unwrap();

        // Collect transitive dependents of `target`.
        let mut dependents = BTreeSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for m in &manifests {
                let hit = m.depends.iter().any(|d| *d == target || dependents.contains(d));
                if hit && dependents.insert(m.name.clone()) {
                    changed = true;
                }
            }
        }

        prop_assert!(graph.get(&target).unwrap().flags.install);
        for m in &manifests {
            let flags = graph.get(&m.name).unwrap().flags;
            if dependents.contains(&m.name) {
                prop_assert!(flags.update);
            } else if m.name != target {
                prop_assert!(!flags.is_pending());
            }
        }
    }
}
