//! Lloyd's k-means with k-means++ seeding and multiple restarts.
//!
//! Operates on borrowed rows of equal dimensionality. Callers validate
//! the input shape; this module only asserts it in debug builds.

use rand::Rng;

/// Tuning knobs for a k-means fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansConfig {
    /// Number of randomized initialisations; the lowest-inertia run wins.
    pub n_init: usize,
    /// Iteration cap per initialisation.
    pub max_iter: usize,
    /// Convergence threshold on the summed squared centroid shift.
    pub tolerance: f64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-8,
        }
    }
}

/// Result of the best initialisation.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster label per input row, in `0..k`.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances from each row to its centroid.
    pub inertia: f64,
    /// Iterations used by the winning initialisation.
    pub iterations: usize,
}

/// Fit `k` clusters over `points`.
///
/// Requires `1 <= k <= points.len()`. Every label in `0..k` is populated
/// in the returned fit.
pub fn fit<R: Rng>(
    points: &[&[f64]],
    k: usize,
    config: &KMeansConfig,
    rng: &mut R,
) -> KMeansFit {
    debug_assert!(k >= 1 && k <= points.len());
    debug_assert!(points.windows(2).all(|w| w[0].len() == w[1].len()));

    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init.max(1) {
        let candidate = fit_once(points, k, config, rng);
        let better = best
            .as_ref()
            .map_or(true, |current| candidate.inertia < current.inertia);
        if better {
            best = Some(candidate);
        }
    }

    // n_init.max(1) guarantees at least one candidate
    best.unwrap_or_else(|| fit_once(points, k, config, rng))
}

fn fit_once<R: Rng>(
    points: &[&[f64]],
    k: usize,
    config: &KMeansConfig,
    rng: &mut R,
) -> KMeansFit {
    let mut centroids = seed_plus_plus(points, k, rng);
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for iter in 0..config.max_iter.max(1) {
        iterations = iter + 1;
        assign(points, &centroids, &mut labels);
        repair_empty_clusters(points, &mut centroids, &mut labels);

        let updated = recompute_centroids(points, &labels, &centroids);
        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = updated;

        if shift <= config.tolerance {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum();

    KMeansFit {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

/// k-means++: first centroid uniform, the rest sampled proportional to D(x)^2.
fn seed_plus_plus<R: Rng>(points: &[&[f64]], k: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..n));

    let mut min_dist: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, points[chosen[0]]))
        .collect();

    while chosen.len() < k {
        let total: f64 = min_dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut pick = n - 1;
            for (idx, d) in min_dist.iter().enumerate() {
                if *d <= 0.0 {
                    continue;
                }
                if target < *d {
                    pick = idx;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // All remaining points coincide with a centroid; pick any unused row.
            let unused: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
            unused[rng.random_range(0..unused.len())]
        };

        chosen.push(next);
        for (idx, p) in points.iter().enumerate() {
            let d = squared_distance(p, points[next]);
            if d < min_dist[idx] {
                min_dist[idx] = d;
            }
        }
    }

    chosen.into_iter().map(|i| points[i].to_vec()).collect()
}

fn assign(points: &[&[f64]], centroids: &[Vec<f64>], labels: &mut [usize]) {
    for (p, label) in points.iter().zip(labels.iter_mut()) {
        *label = nearest(p, centroids);
    }
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best_dist {
            best = idx;
            best_dist = d;
        }
    }
    best
}

/// Move the worst-fitting point of a multi-member cluster into each empty one.
fn repair_empty_clusters(points: &[&[f64]], centroids: &mut [Vec<f64>], labels: &mut [usize]) {
    let k = centroids.len();
    let mut counts = vec![0usize; k];
    for &l in labels.iter() {
        counts[l] += 1;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| counts[**l] > 1)
            .map(|(idx, l)| (idx, squared_distance(points[idx], &centroids[*l])))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx);

        if let Some(idx) = donor {
            counts[labels[idx]] -= 1;
            labels[idx] = empty;
            counts[empty] = 1;
            centroids[empty] = points[idx].to_vec();
        }
    }
}

fn recompute_centroids(points: &[&[f64]], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (p, &l) in points.iter().zip(labels) {
        counts[l] += 1;
        for (acc, v) in sums[l].iter_mut().zip(p.iter()) {
            *acc += v;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn separates_two_obvious_blobs() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let fit = fit(&rows(&data), 2, &KMeansConfig::default(), &mut rng);

        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[1], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_eq!(fit.labels[4], fit.labels[5]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn identical_points_still_fill_every_cluster() {
        let data = vec![vec![1.0, 1.0]; 5];
        let mut rng = StdRng::seed_from_u64(1);
        let fit = fit(&rows(&data), 3, &KMeansConfig::default(), &mut rng);

        let mut seen = fit.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn k_equal_to_n_gives_singletons() {
        let data = vec![vec![0.0], vec![5.0], vec![9.0]];
        let mut rng = StdRng::seed_from_u64(3);
        let fit = fit(&rows(&data), 3, &KMeansConfig::default(), &mut rng);

        let mut seen = fit.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn single_cluster_centroid_is_mean() {
        let data = vec![vec![0.0, 2.0], vec![2.0, 0.0]];
        let mut rng = StdRng::seed_from_u64(11);
        let fit = fit(&rows(&data), 1, &KMeansConfig::default(), &mut rng);

        assert_eq!(fit.labels, vec![0, 0]);
        assert!((fit.centroids[0][0] - 1.0).abs() < 1e-12);
        assert!((fit.centroids[0][1] - 1.0).abs() < 1e-12);
    }
}
