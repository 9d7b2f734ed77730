//! Distance metrics for vector similarity calculation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimdexError};

/// Distance metrics supported by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Inner-product similarity (higher is more similar). With unit-norm
    /// vectors this is cosine similarity.
    #[default]
    InnerProduct,
    /// Euclidean (L2) distance.
    Euclidean,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    ///
    /// Smaller is always closer: inner product is negated so that both
    /// metrics rank ascending by distance.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(SimdexError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }

        let result = match self {
            DistanceMetric::InnerProduct => {
                -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
            }
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
        };

        Ok(result)
    }

    /// Convert a distance produced by [`distance`](Self::distance) to the
    /// similarity scale callers sort descending on.
    ///
    /// This is the single monotonic decreasing transform used everywhere
    /// within one configuration: inner product passes through unchanged
    /// (undoing the negation), Euclidean maps through `1 / (1 + d)`.
    pub fn to_similarity(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::InnerProduct => -distance,
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
        }
    }

    /// Whether vectors should be scaled to unit L2 norm before storage
    /// and query under this metric.
    pub fn normalizes(&self) -> bool {
        matches!(self, DistanceMetric::InnerProduct)
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inner_product" | "ip" | "cosine" => Ok(DistanceMetric::InnerProduct),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            _ => Err(SimdexError::invalid_config(format!(
                "unknown distance metric: {s}"
            ))),
        }
    }

    /// Calculate distances between a query vector and many vectors,
    /// in parallel for large batches.
    pub fn batch_distance(&self, query: &[f32], vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        if vectors.len() < 1000 {
            return vectors
                .iter()
                .map(|v| self.distance(query, v))
                .collect::<Result<Vec<_>>>();
        }

        vectors
            .par_iter()
            .map(|v| self.distance(query, v))
            .collect::<Result<Vec<_>>>()
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
