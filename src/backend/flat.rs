//! Exact brute-force backend.

use serde::{Deserialize, Serialize};

use crate::backend::{IndexBackend, check_dimension, rank_candidates};
use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// Stores vectors contiguously and answers queries with an exact scan,
/// parallelized for large collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatBackend {
    metric: DistanceMetric,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatBackend {
    /// Create an empty flat backend.
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            metric,
            dimension,
            vectors: Vec::new(),
        }
    }
}

impl IndexBackend for FlatBackend {
    fn kind_name(&self) -> &'static str {
        "flat"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<usize>> {
        for vector in vectors {
            check_dimension(self.dimension, vector)?;
        }
        let start = self.vectors.len();
        self.vectors.extend(vectors.iter().cloned());
        Ok((start..self.vectors.len()).collect())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        let distances = self.metric.batch_distance(query, &self.vectors)?;
        let candidates = distances.into_iter().enumerate().collect();
        Ok(rank_candidates(candidates, k))
    }

    fn reconstruct(&self, position: usize) -> Result<Vec<f32>> {
        self.vectors
            .get(position)
            .cloned()
            .ok_or_else(|| SimdexError::backend(format!("position {position} out of range")))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
