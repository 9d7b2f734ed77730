//! Metric-appropriate vector normalization.

use rand::Rng;
use rayon::prelude::*;
use tracing::warn;

use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// Norms below this are treated as zero vectors.
const ZERO_NORM_EPSILON: f32 = 1e-10;

/// Applies metric-appropriate normalization to vectors before storage
/// and query.
///
/// Inner-product metrics scale vectors to unit L2 norm so the score is
/// cosine similarity; distance metrics pass vectors through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct VectorNormalizer {
    metric: DistanceMetric,
    dimension: usize,
}

impl VectorNormalizer {
    /// Create a normalizer for the given metric and dimension.
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self { metric, dimension }
    }

    /// L2 norm of a vector.
    pub fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Normalize a vector for storage or query.
    ///
    /// A vector whose norm is effectively zero cannot be scaled to unit
    /// length; a small random unit vector is substituted instead of
    /// propagating NaN, and the substitution is logged as a data-quality
    /// signal.
    pub fn normalize(&self, vector: &[f32]) -> Result<Vec<f32>> {
        if vector.len() != self.dimension {
            return Err(SimdexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        if !self.metric.normalizes() {
            return Ok(vector.to_vec());
        }

        let norm = Self::norm(vector);
        if norm < ZERO_NORM_EPSILON || !norm.is_finite() {
            warn!(
                dimension = self.dimension,
                norm, "zero-norm vector substituted with random unit vector"
            );
            return Ok(self.random_unit_vector());
        }

        Ok(vector.iter().map(|x| x / norm).collect())
    }

    /// Normalize a batch of vectors, in parallel for large batches.
    pub fn normalize_batch(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if vectors.len() > 100 {
            vectors.par_iter().map(|v| self.normalize(v)).collect()
        } else {
            vectors.iter().map(|v| self.normalize(v)).collect()
        }
    }

    fn random_unit_vector(&self) -> Vec<f32> {
        let mut rng = rand::rng();
        let mut v: Vec<f32> = (0..self.dimension)
            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
            .collect();
        let norm = Self::norm(&v);
        // Drawing the zero vector from a continuous distribution is not a
        // practical concern, but guard the division anyway.
        if norm < ZERO_NORM_EPSILON {
            v[0] = 1.0;
            return v;
        }
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_product_scales_to_unit_norm() {
        let normalizer = VectorNormalizer::new(DistanceMetric::InnerProduct, 3);
        let v = normalizer.normalize(&[3.0, 0.0, 4.0]).unwrap();
        assert!((VectorNormalizer::norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_passes_through() {
        let normalizer = VectorNormalizer::new(DistanceMetric::Euclidean, 2);
        let v = normalizer.normalize(&[3.0, 4.0]).unwrap();
        assert_eq!(v, vec![3.0, 4.0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let normalizer = VectorNormalizer::new(DistanceMetric::InnerProduct, 4);
        let err = normalizer.normalize(&[1.0, 2.0]).unwrap_err();
        match err {
            SimdexError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            _ => panic!("expected DimensionMismatch"),
        }
    }

    #[test]
    fn test_zero_vector_substituted_with_unit_vector() {
        let normalizer = VectorNormalizer::new(DistanceMetric::InnerProduct, 8);
        let v = normalizer.normalize(&[0.0; 8]).unwrap();
        assert!((VectorNormalizer::norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_batch_matches_single() {
        let normalizer = VectorNormalizer::new(DistanceMetric::InnerProduct, 2);
        let batch = normalizer
            .normalize_batch(&[vec![2.0, 0.0], vec![0.0, 5.0]])
            .unwrap();
        assert_eq!(batch[0], normalizer.normalize(&[2.0, 0.0]).unwrap());
        assert_eq!(batch[1], normalizer.normalize(&[0.0, 5.0]).unwrap());
    }
}
