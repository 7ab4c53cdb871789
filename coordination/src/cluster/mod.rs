//! Opinion clustering
//!
//! Partitions the successful worker results into at most K groups by
//! vector similarity, then keeps one representative per group so the
//! synthesizer sees each distinct line of thought once.
//!
//! # Pipeline
//!
//! ```text
//! valid results ──▶ k-means (n_init restarts) ──▶ ClusterAssignment
//!                                                   │
//!             first-seen scan over original order ◀─┘
//!                         │
//!                         ▼
//!                RepresentativeSet + chart projection
//! ```
//!
//! Labels are arbitrary partition ids. Two runs over the same vectors may
//! permute them unless a seed is fixed with [`Clusterer::with_seed`].

pub mod kmeans;

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::debug;

use crate::types::{truncate_chars, ChartPoint, WorkResult, WorkerId};

pub use kmeans::{KMeansConfig, KMeansFit};

/// Characters of content kept on each chart point.
const CHART_PREVIEW_CHARS: usize = 50;

/// Errors from clustering preconditions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("no valid results to cluster")]
    EmptyInput,

    #[error("result {0} is not a SUCCESS record")]
    NotSuccessful(WorkerId),

    #[error("result {0} carries an empty vector")]
    EmptyVector(WorkerId),

    #[error("result {worker} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        worker: WorkerId,
        expected: usize,
        found: usize,
    },
}

/// Label per valid result, indexed like the clusterer input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    k: usize,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<usize>, k: usize) -> Self {
        Self { labels, k }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.labels.get(index).copied()
    }

    /// The K the partition was computed with.
    pub fn requested_k(&self) -> usize {
        self.k
    }

    /// Number of distinct labels actually used.
    pub fn cluster_count(&self) -> usize {
        self.labels.iter().collect::<HashSet<_>>().len()
    }

    /// Members per label, indexed by label.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &l in &self.labels {
            if l >= sizes.len() {
                sizes.resize(l + 1, 0);
            }
            sizes[l] += 1;
        }
        sizes
    }
}

/// Everything a clustering pass produces.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// One result per distinct label, in first-occurrence order.
    pub representatives: Vec<WorkResult>,
    pub assignment: ClusterAssignment,
    /// Lossy 2-D scatter (raw dimensions 0 and 1) for visualization only.
    pub projection: Vec<ChartPoint>,
    /// Sum of squared distances to centroids for the winning restart.
    pub inertia: f64,
}

impl ClusterOutcome {
    /// Per-cluster summary in representative order.
    pub fn summaries(&self, valid: &[WorkResult]) -> Vec<ClusterSummary> {
        let sizes = self.assignment.sizes();
        self.representatives
            .iter()
            .filter_map(|rep| {
                let idx = valid.iter().position(|r| r.id == rep.id)?;
                let label = self.assignment.label(idx)?;
                Some(ClusterSummary {
                    label,
                    representative_id: rep.id,
                    representative_role: rep.role.clone(),
                    members: sizes.get(label).copied().unwrap_or(0),
                })
            })
            .collect()
    }
}

/// Compact description of one cluster for logs and the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSummary {
    pub label: usize,
    pub representative_id: WorkerId,
    pub representative_role: String,
    pub members: usize,
}

/// Centroid-based clusterer with multiple randomized initialisations.
#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: KMeansConfig,
    seed: Option<u64>,
}

impl Clusterer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: KMeansConfig) -> Self {
        self.config = config;
        self
    }

    /// Fix the RNG seed for reproducible partitions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Partition `valid` into at most `max_clusters` groups.
    pub fn cluster(
        &self,
        valid: &[WorkResult],
        max_clusters: usize,
    ) -> Result<ClusterOutcome, ClusterError> {
        let rows = vectors_of(valid)?;
        let k = effective_k(max_clusters, valid.len());

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let fit = kmeans::fit(&rows, k, &self.config, &mut rng);
        debug!(
            k,
            n = valid.len(),
            inertia = fit.inertia,
            iterations = fit.iterations,
            "k-means fit complete"
        );

        let assignment = ClusterAssignment::new(fit.labels, k);
        let representatives = select_representatives(valid, &assignment);
        let projection = project(valid, &assignment);

        Ok(ClusterOutcome {
            representatives,
            assignment,
            projection,
            inertia: fit.inertia,
        })
    }
}

/// `K = min(max_clusters, n)`, clamped up to 1.
pub fn effective_k(max_clusters: usize, n: usize) -> usize {
    let k = max_clusters.min(n);
    if k < 2 {
        1
    } else {
        k
    }
}

/// Linear scan in input order; the first item seen for a label represents it.
pub fn select_representatives(valid: &[WorkResult], assignment: &ClusterAssignment) -> Vec<WorkResult> {
    let wanted = assignment.cluster_count();
    let mut seen = HashSet::with_capacity(wanted);
    let mut reps = Vec::with_capacity(wanted);

    for (item, &label) in valid.iter().zip(assignment.labels()) {
        if seen.insert(label) {
            reps.push(item.clone());
            if seen.len() >= wanted {
                break;
            }
        }
    }
    reps
}

/// Raw dimensions 0/1 as x/y. Missing dimensions read as 0.0.
pub fn project(valid: &[WorkResult], assignment: &ClusterAssignment) -> Vec<ChartPoint> {
    valid
        .iter()
        .zip(assignment.labels())
        .map(|(item, &cluster)| {
            let vector = item.vector().unwrap_or(&[]);
            ChartPoint {
                worker_id: item.id,
                role: item.role.clone(),
                cluster,
                content_preview: truncate_chars(item.content().unwrap_or(""), CHART_PREVIEW_CHARS),
                x: vector.first().copied().unwrap_or(0.0),
                y: vector.get(1).copied().unwrap_or(0.0),
            }
        })
        .collect()
}

fn vectors_of(valid: &[WorkResult]) -> Result<Vec<&[f64]>, ClusterError> {
    if valid.is_empty() {
        return Err(ClusterError::EmptyInput);
    }

    let mut rows = Vec::with_capacity(valid.len());
    let mut expected = None;
    for item in valid {
        let vector = item.vector().ok_or(ClusterError::NotSuccessful(item.id))?;
        if vector.is_empty() {
            return Err(ClusterError::EmptyVector(item.id));
        }
        match expected {
            None => expected = Some(vector.len()),
            Some(dim) if dim != vector.len() => {
                return Err(ClusterError::DimensionMismatch {
                    worker: item.id,
                    expected: dim,
                    found: vector.len(),
                })
            }
            Some(_) => {}
        }
        rows.push(vector);
    }
    Ok(rows)
}
