//! Inverted-file backend with a k-means coarse quantizer.
//!
//! Vectors are bucketed under their nearest trained centroid; a query
//! scans the `n_probe` closest buckets. With quantization enabled, each
//! bucket scan ranks 8-bit scalar-quantized codes first and reranks the
//! best candidates at full precision.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{IndexBackend, check_dimension, rank_candidates};
use crate::config::IvfParams;
use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// K-means iteration cap.
const MAX_KMEANS_ITERATIONS: usize = 25;
/// Mean centroid movement below which training stops.
const CONVERGENCE_THRESHOLD: f32 = 1e-4;
/// Full-precision rerank depth multiplier for quantized scans.
const RERANK_FACTOR: usize = 4;

/// Inverted-file backend. Requires a training pass before vectors can be
/// added; the optimizer rebuilds a fresh instance rather than retraining
/// in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfBackend {
    metric: DistanceMetric,
    dimension: usize,
    params: IvfParams,
    quantized: bool,
    trained: bool,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
    vectors: Vec<Vec<f32>>,
    codes: Vec<Vec<u8>>,
    calib_min: Vec<f32>,
    calib_max: Vec<f32>,
    n_probe: usize,
}

impl IvfBackend {
    /// Create an untrained inverted-file backend.
    pub fn new(metric: DistanceMetric, dimension: usize, params: IvfParams, quantized: bool) -> Self {
        Self {
            metric,
            dimension,
            params,
            quantized,
            trained: false,
            centroids: Vec::new(),
            lists: Vec::new(),
            vectors: Vec::new(),
            codes: Vec::new(),
            calib_min: Vec::new(),
            calib_max: Vec::new(),
            n_probe: params.n_probe,
        }
    }

    /// Default cluster count for a dataset size: `sqrt(n)` bounded to a
    /// practical range.
    fn default_clusters(n_vectors: usize) -> usize {
        ((n_vectors as f64).sqrt() as usize).clamp(1, 4096)
    }

    fn find_nearest_centroid(&self, vector: &[f32]) -> usize {
        let mut best_cluster = 0;
        let mut best_distance = f32::INFINITY;
        for (i, centroid) in self.centroids.iter().enumerate() {
            if let Ok(distance) = self.metric.distance(vector, centroid)
                && distance < best_distance
            {
                best_distance = distance;
                best_cluster = i;
            }
        }
        best_cluster
    }

    /// Initialize centroids with k-means++ seeding.
    fn init_centroids(&mut self, sample: &[Vec<f32>], k: usize) {
        let mut rng = rand::rng();
        self.centroids.clear();

        let first = rng.random_range(0..sample.len());
        self.centroids.push(sample[first].clone());

        while self.centroids.len() < k {
            let mut weights = Vec::with_capacity(sample.len());
            let mut total = 0.0f32;
            for vector in sample {
                let min_dist = self
                    .centroids
                    .iter()
                    .map(|c| self.metric.distance(vector, c).unwrap_or(f32::INFINITY))
                    .fold(f32::INFINITY, f32::min);
                let weight = (min_dist * min_dist).max(0.0);
                weights.push(weight);
                total += weight;
            }

            if total <= 0.0 || !total.is_finite() {
                let idx = rng.random_range(0..sample.len());
                self.centroids.push(sample[idx].clone());
                continue;
            }

            let target = rng.random::<f32>() * total;
            let mut cumulative = 0.0;
            let mut chosen = sample.len() - 1;
            for (i, &weight) in weights.iter().enumerate() {
                cumulative += weight;
                if cumulative >= target {
                    chosen = i;
                    break;
                }
            }
            self.centroids.push(sample[chosen].clone());
        }
    }

    fn assign_sample(&self, sample: &[Vec<f32>]) -> Vec<usize> {
        if sample.len() > 1000 {
            sample
                .par_iter()
                .map(|v| self.find_nearest_centroid(v))
                .collect()
        } else {
            sample.iter().map(|v| self.find_nearest_centroid(v)).collect()
        }
    }

    fn update_centroids(&mut self, sample: &[Vec<f32>], assignments: &[usize]) {
        let k = self.centroids.len();
        let mut sums = vec![vec![0.0f32; self.dimension]; k];
        let mut counts = vec![0usize; k];

        for (i, vector) in sample.iter().enumerate() {
            let cluster = assignments[i];
            counts[cluster] += 1;
            for (j, &value) in vector.iter().enumerate() {
                sums[cluster][j] += value;
            }
        }

        for (i, (sum, count)) in sums.iter().zip(counts.iter()).enumerate() {
            if *count == 0 {
                // Keep the old centroid when no vectors were assigned.
                continue;
            }
            self.centroids[i] = sum.iter().map(|&s| s / *count as f32).collect();
        }
    }

    fn mean_movement(&self, old_centroids: &[Vec<f32>]) -> f32 {
        if old_centroids.len() != self.centroids.len() {
            return f32::INFINITY;
        }
        let total: f32 = old_centroids
            .iter()
            .zip(self.centroids.iter())
            .map(|(old, new)| {
                DistanceMetric::Euclidean
                    .distance(old, new)
                    .unwrap_or(f32::INFINITY)
            })
            .sum();
        total / self.centroids.len() as f32
    }

    fn train_calibration(&mut self, sample: &[Vec<f32>]) {
        let mut min_values = vec![f32::INFINITY; self.dimension];
        let mut max_values = vec![f32::NEG_INFINITY; self.dimension];
        for vector in sample {
            for (i, &value) in vector.iter().enumerate() {
                min_values[i] = min_values[i].min(value);
                max_values[i] = max_values[i].max(value);
            }
        }
        self.calib_min = min_values;
        self.calib_max = max_values;
    }

    fn quantize(&self, vector: &[f32]) -> Vec<u8> {
        vector
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let min = self.calib_min[i];
                let range = self.calib_max[i] - min;
                if range > 0.0 {
                    (((value - min) / range) * 255.0).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }

    fn dequantize(&self, codes: &[u8]) -> Vec<f32> {
        codes
            .iter()
            .enumerate()
            .map(|(i, &code)| {
                let min = self.calib_min[i];
                let range = self.calib_max[i] - min;
                min + (code as f32 / 255.0) * range
            })
            .collect()
    }

    /// Rank centroids by distance to the query and return the `n_probe`
    /// closest list indices.
    fn probe_lists(&self, query: &[f32], breadth: usize) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.metric.distance(query, c).unwrap_or(f32::INFINITY)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(breadth.max(1));
        ranked.into_iter().map(|(i, _)| i).collect()
    }
}

impl IndexBackend for IvfBackend {
    fn kind_name(&self) -> &'static str {
        if self.quantized { "ivf_quantized" } else { "ivf" }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.vectors.len()
    }

    fn requires_training(&self) -> bool {
        true
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn train(&mut self, sample: &[Vec<f32>]) -> Result<()> {
        if sample.is_empty() {
            return Err(SimdexError::backend("cannot train on an empty sample"));
        }
        if !self.vectors.is_empty() {
            return Err(SimdexError::backend(
                "cannot retrain a populated backend; build a fresh instance",
            ));
        }
        for vector in sample {
            check_dimension(self.dimension, vector)?;
        }

        let configured = if self.params.n_clusters == 0 {
            Self::default_clusters(sample.len())
        } else {
            self.params.n_clusters
        };
        let k = configured.min(sample.len());

        self.init_centroids(sample, k);
        for iteration in 0..MAX_KMEANS_ITERATIONS {
            let old_centroids = self.centroids.clone();
            let assignments = self.assign_sample(sample);
            self.update_centroids(sample, &assignments);
            if self.mean_movement(&old_centroids) < CONVERGENCE_THRESHOLD {
                debug!(iterations = iteration + 1, clusters = k, "k-means converged");
                break;
            }
        }

        self.lists = vec![Vec::new(); self.centroids.len()];
        if self.quantized {
            self.train_calibration(sample);
        }
        self.trained = true;
        Ok(())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<usize>> {
        if !self.trained {
            return Err(SimdexError::backend("inverted-file backend is not trained"));
        }
        for vector in vectors {
            check_dimension(self.dimension, vector)?;
        }

        let mut positions = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let position = self.vectors.len();
            let cluster = self.find_nearest_centroid(vector);
            self.lists[cluster].push(position);
            if self.quantized {
                self.codes.push(self.quantize(vector));
            }
            self.vectors.push(vector.clone());
            positions.push(position);
        }
        Ok(positions)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        if k == 0 || self.vectors.is_empty() || !self.trained {
            return Ok(Vec::new());
        }

        let lists = self.probe_lists(query, self.n_probe);
        let candidates: Vec<usize> = lists
            .iter()
            .flat_map(|&list| self.lists[list].iter().copied())
            .collect();

        if self.quantized {
            // Coarse pass over dequantized codes, then full-precision
            // rerank of the best candidates.
            let mut coarse: Vec<(usize, f32)> = candidates
                .iter()
                .map(|&position| {
                    let approx = self.dequantize(&self.codes[position]);
                    let distance = self
                        .metric
                        .distance(query, &approx)
                        .unwrap_or(f32::INFINITY);
                    (position, distance)
                })
                .collect();
            coarse.sort_by(|a, b| a.1.total_cmp(&b.1));
            coarse.truncate(k.saturating_mul(RERANK_FACTOR).max(k));

            let reranked: Vec<(usize, f32)> = coarse
                .into_iter()
                .map(|(position, _)| {
                    let distance = self
                        .metric
                        .distance(query, &self.vectors[position])
                        .unwrap_or(f32::INFINITY);
                    (position, distance)
                })
                .collect();
            return Ok(rank_candidates(reranked, k));
        }

        let exact: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|position| {
                let distance = self
                    .metric
                    .distance(query, &self.vectors[position])
                    .unwrap_or(f32::INFINITY);
                (position, distance)
            })
            .collect();
        Ok(rank_candidates(exact, k))
    }

    fn reconstruct(&self, position: usize) -> Result<Vec<f32>> {
        self.vectors
            .get(position)
            .cloned()
            .ok_or_else(|| SimdexError::backend(format!("position {position} out of range")))
    }

    fn search_breadth(&self) -> usize {
        self.n_probe
    }

    fn set_search_breadth(&mut self, breadth: usize) {
        self.n_probe = breadth.max(1);
    }

    fn estimated_memory(&self) -> usize {
        let vectors = self.vectors.len() * self.dimension * std::mem::size_of::<f32>();
        let centroids = self.centroids.len() * self.dimension * std::mem::size_of::<f32>();
        let codes = self.codes.len() * self.dimension;
        let lists: usize = self.lists.iter().map(|l| l.len() * 8).sum();
        vectors + centroids + codes + lists
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
