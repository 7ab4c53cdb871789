//! Clustering property tests: partition invariants across sizes, K and
//! seeds.
//!
//! Tests verify:
//! - Representative count equals min(K, n) (never zero for n >= 1)
//! - Representatives have pairwise-distinct labels
//! - Every valid result carries exactly one label
//! - Representatives are first-seen in input order
//! - Chart projection has one point per valid result

use std::collections::HashSet;

use coordination::cluster::{effective_k, Clusterer};
use coordination::types::{WorkResult, WorkerId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random unit-cube vectors, like simulated workers produce.
fn random_results(n: usize, dim: usize, seed: u64) -> Vec<WorkResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let vector: Vec<f64> = (0..dim).map(|_| rng.random::<f64>()).collect();
            WorkResult::success(
                WorkerId(i),
                format!("role-{}", i % 8),
                format!("opinion {}", i),
                vector,
            )
        })
        .collect()
}

const SIZES: [usize; 7] = [1, 2, 3, 5, 10, 23, 50];
const KS: [usize; 5] = [1, 2, 3, 5, 8];
const SEEDS: [u64; 3] = [1, 17, 4242];

// ── Property: cluster count ───────────────────────────────────────

#[test]
fn prop_representative_count_is_min_k_n() {
    for n in SIZES {
        for k in KS {
            for seed in SEEDS {
                let items = random_results(n, 16, seed);
                let outcome = Clusterer::new()
                    .with_seed(seed)
                    .cluster(&items, k)
                    .unwrap();

                assert_eq!(
                    outcome.representatives.len(),
                    effective_k(k, n),
                    "n={}, k={}, seed={}",
                    n,
                    k,
                    seed
                );
                assert_eq!(outcome.assignment.cluster_count(), k.min(n).max(1));
            }
        }
    }
}

// ── Property: representatives carry distinct labels ────────────────

#[test]
fn prop_representative_labels_distinct() {
    for n in SIZES {
        for k in KS {
            let items = random_results(n, 8, n as u64 * 31 + k as u64);
            let outcome = Clusterer::new().with_seed(7).cluster(&items, k).unwrap();

            let mut labels = HashSet::new();
            for rep in &outcome.representatives {
                let idx = items.iter().position(|r| r.id == rep.id).unwrap();
                let label = outcome.assignment.label(idx).unwrap();
                assert!(labels.insert(label), "n={}, k={}: duplicate label {}", n, k, label);
            }
        }
    }
}

// ── Property: every valid result is labelled once ─────────────────

#[test]
fn prop_partition_covers_input() {
    for n in SIZES {
        for k in KS {
            let items = random_results(n, 4, 99);
            let outcome = Clusterer::new().with_seed(3).cluster(&items, k).unwrap();

            assert_eq!(outcome.assignment.labels().len(), n);
            assert_eq!(outcome.assignment.sizes().iter().sum::<usize>(), n);
            let effective = effective_k(k, n);
            assert!(outcome.assignment.labels().iter().all(|&l| l < effective));
        }
    }
}

// ── Property: first-seen order ─────────────────────────────────────

#[test]
fn prop_representatives_are_first_seen() {
    for n in SIZES {
        for seed in SEEDS {
            let items = random_results(n, 8, seed);
            let outcome = Clusterer::new().with_seed(seed).cluster(&items, 5).unwrap();

            let mut seen = HashSet::new();
            let expected: Vec<WorkerId> = items
                .iter()
                .zip(outcome.assignment.labels())
                .filter(|(_, label)| seen.insert(**label))
                .map(|(item, _)| item.id)
                .collect();
            let actual: Vec<WorkerId> = outcome.representatives.iter().map(|r| r.id).collect();
            assert_eq!(actual, expected, "n={}, seed={}", n, seed);
        }
    }
}

// ── Property: chart projection ─────────────────────────────────────

#[test]
fn prop_projection_matches_valid_set() {
    for n in SIZES {
        let items = random_results(n, 128, 5);
        let outcome = Clusterer::new().with_seed(5).cluster(&items, 5).unwrap();

        assert_eq!(outcome.projection.len(), n);
        for (point, item) in outcome.projection.iter().zip(&items) {
            let vector = item.vector().unwrap();
            assert_eq!(point.worker_id, item.id);
            assert_eq!(point.x, vector[0]);
            assert_eq!(point.y, vector[1]);
            assert!((0.0..=1.0).contains(&point.x));
        }
    }
}

// ── Property: identical opinions still yield K representatives ────

#[test]
fn prop_degenerate_vectors_fill_k() {
    for n in [3usize, 10, 50] {
        let items: Vec<WorkResult> = (0..n)
            .map(|i| WorkResult::success(WorkerId(i), "Economist", "same".into(), vec![0.5; 16]))
            .collect();
        let outcome = Clusterer::new().with_seed(11).cluster(&items, 3).unwrap();
        assert_eq!(outcome.representatives.len(), 3, "n={}", n);
    }
}
