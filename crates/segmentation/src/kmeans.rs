//! Centroid clustering (k-means) over numeric feature vectors.
//!
//! Centroids start as random vectors in `[0, init_upper_bound)` regardless of
//! the data's own range, and refinement stops after at most
//! [`MAX_KMEANS_ITERATIONS`] rounds.

use datalens_core::config::{KMeansConfig, MAX_KMEANS_ITERATIONS, MAX_SEGMENTS};
use datalens_core::value::finite_float;
use datalens_core::{value_of, Row};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansFit {
    /// Cluster index per input point.
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
}

impl KMeansFit {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &cluster in &self.assignments {
            sizes[cluster] += 1;
        }
        sizes
    }
}

#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
    init_upper_bound: f64,
}

impl KMeans {
    /// `k` is clamped to `1..=MAX_SEGMENTS`.
    pub fn new(k: usize) -> Self {
        Self {
            k: k.clamp(1, MAX_SEGMENTS),
            max_iterations: MAX_KMEANS_ITERATIONS,
            init_upper_bound: 100.0,
        }
    }

    pub fn from_config(k: usize, config: &KMeansConfig) -> Self {
        Self::new(k)
            .with_max_iterations(config.effective_max_iterations())
            .with_init_upper_bound(config.init_upper_bound)
    }

    /// Lower the round limit. Values above the hard cap are clamped.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.clamp(1, MAX_KMEANS_ITERATIONS);
        self
    }

    pub fn with_init_upper_bound(mut self, upper: f64) -> Self {
        self.init_upper_bound = upper;
        self
    }

    /// `k` vectors of `dims` components, each uniform in `[0, init_upper_bound)`.
    pub fn random_centroids<R: Rng + ?Sized>(&self, dims: usize, rng: &mut R) -> Vec<Vec<f64>> {
        (0..self.k)
            .map(|_| {
                (0..dims)
                    .map(|_| rng.gen::<f64>() * self.init_upper_bound)
                    .collect()
            })
            .collect()
    }

    pub fn fit<R: Rng + ?Sized>(&self, points: &[Vec<f64>], rng: &mut R) -> KMeansFit {
        let dims = points.first().map_or(0, Vec::len);
        let centroids = self.random_centroids(dims, rng);
        self.fit_with_centroids(points, centroids)
    }

    /// Refine from caller-supplied starting centroids; `k` is taken from
    /// their count.
    pub fn fit_with_centroids(&self, points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> KMeansFit {
        let dims = points.first().map_or(0, Vec::len);
        if centroids.is_empty() {
            centroids.push(vec![0.0; dims]);
        }

        let mut assignments: Vec<Option<usize>> = vec![None; points.len()];
        let mut iterations = 0;
        let mut converged = points.is_empty();

        if !points.is_empty() {
            for round in 1..=self.max_iterations {
                iterations = round;
                let mut changed = false;

                for (slot, point) in assignments.iter_mut().zip(points) {
                    let nearest = nearest_centroid(point, &centroids);
                    if *slot != Some(nearest) {
                        *slot = Some(nearest);
                        changed = true;
                    }
                }

                if !changed {
                    converged = true;
                    break;
                }

                recompute_centroids(points, &assignments, &mut centroids);
            }
        }

        debug!(
            k = centroids.len(),
            points = points.len(),
            iterations,
            converged,
            "K-means finished"
        );

        KMeansFit {
            assignments: assignments.into_iter().map(|a| a.unwrap_or(0)).collect(),
            centroids,
            iterations,
            converged,
        }
    }
}

/// One vector per row; unparsable values contribute 0.
pub fn feature_vectors(rows: &[Row], columns: &[String]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| finite_float(value_of(row, c)).unwrap_or(0.0))
                .collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_distance {
            best_distance = d;
            best = idx;
        }
    }
    best
}

/// Move each centroid to the mean of its points. Centroids with no points
/// keep their position.
fn recompute_centroids(points: &[Vec<f64>], assignments: &[Option<usize>], centroids: &mut [Vec<f64>]) {
    let dims = points.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dims]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (point, cluster) in points.iter().zip(assignments) {
        if let Some(cluster) = *cluster {
            counts[cluster] += 1;
            for (sum, x) in sums[cluster].iter_mut().zip(point) {
                *sum += x;
            }
        }
    }

    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *centroid = sum.into_iter().map(|s| s / count as f64).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn points(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn test_single_cluster_takes_everything() {
        let data = points(&[1.0, 50.0, 99.0, 1000.0]);
        let mut rng = StdRng::seed_from_u64(42);
        let fit = KMeans::new(1).fit(&data, &mut rng);
        assert!(fit.assignments.iter().all(|&a| a == 0));
        assert_eq!(fit.cluster_sizes(), vec![4]);
        assert!((fit.centroids[0][0] - 287.5).abs() < 1e-9);
        assert!(fit.converged);
    }

    #[test]
    fn test_two_obvious_groups() {
        let data = points(&[1.0, 2.0, 3.0, 97.0, 98.0, 99.0]);
        let fit = KMeans::new(2).fit_with_centroids(&data, vec![vec![10.0], vec![90.0]]);
        assert_eq!(fit.assignments, vec![0, 0, 0, 1, 1, 1]);
        assert!((fit.centroids[0][0] - 2.0).abs() < 1e-9);
        assert!((fit.centroids[1][0] - 98.0).abs() < 1e-9);
        assert!(fit.converged);
        assert_eq!(fit.iterations, 2);
    }

    #[test]
    fn test_empty_cluster_keeps_centroid() {
        let data = points(&[1.0, 2.0]);
        let fit = KMeans::new(2).fit_with_centroids(&data, vec![vec![0.0], vec![500.0]]);
        assert_eq!(fit.cluster_sizes(), vec![2, 0]);
        assert_eq!(fit.centroids[1], vec![500.0]);
    }

    #[test]
    fn test_k_at_least_rows_gives_singletons() {
        let data = points(&[5.0, 40.0, 80.0]);
        let seeds = vec![vec![5.0], vec![40.0], vec![80.0], vec![60.0]];
        let fit = KMeans::new(4).fit_with_centroids(&data, seeds);
        assert!(fit.cluster_sizes().iter().all(|&size| size <= 1));
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let data: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i * 7 % 100) as f64, (i * 13 % 100) as f64])
            .collect();
        let a = KMeans::new(3).fit(&data, &mut StdRng::seed_from_u64(7));
        let b = KMeans::new(3).fit(&data, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_random_centroids_in_range() {
        let km = KMeans::new(5);
        let centroids = km.random_centroids(3, &mut StdRng::seed_from_u64(1));
        assert_eq!(centroids.len(), 5);
        for c in centroids {
            assert_eq!(c.len(), 3);
            assert!(c.iter().all(|&x| (0.0..100.0).contains(&x)));
        }
    }

    #[test]
    fn test_cluster_count_is_clamped() {
        let km = KMeans::new(usize::MAX);
        let centroids = km.random_centroids(1, &mut StdRng::seed_from_u64(2));
        assert_eq!(centroids.len(), MAX_SEGMENTS);
        assert_eq!(KMeans::new(0).random_centroids(1, &mut StdRng::seed_from_u64(2)).len(), 1);
    }

    #[test]
    fn test_iteration_cap() {
        let km = KMeans::new(2).with_max_iterations(10_000);
        assert_eq!(km.max_iterations, MAX_KMEANS_ITERATIONS);
        let data = points(&[1.0, 2.0, 3.0, 97.0, 98.0, 99.0]);
        let fit = km
            .with_max_iterations(1)
            .fit_with_centroids(&data, vec![vec![10.0], vec![90.0]]);
        assert_eq!(fit.iterations, 1);
        assert!(!fit.converged);
    }

    #[test]
    fn test_no_points() {
        let fit = KMeans::new(3).fit(&[], &mut StdRng::seed_from_u64(0));
        assert!(fit.assignments.is_empty());
        assert_eq!(fit.iterations, 0);
    }

    #[test]
    fn test_feature_vectors_zero_fill() {
        let mut row = Row::new();
        row.insert("a".into(), serde_json::json!("12"));
        row.insert("b".into(), serde_json::json!("oops"));
        let vectors = feature_vectors(&[row], &["a".into(), "b".into(), "c".into()]);
        assert_eq!(vectors, vec![vec![12.0, 0.0, 0.0]]);
    }
}
