//! Nearest-neighbor backend contract and reference implementations.
//!
//! The manager never depends on a concrete structure: every backend kind
//! implements [`IndexBackend`], and the configuration's [`BackendKind`]
//! decides which concrete type the factory constructs and how persisted
//! backend bytes are interpreted.

pub mod flat;
pub mod hnsw;
pub mod ivf;
pub mod lsh;

use crate::config::{BackendKind, IndexConfiguration};
use crate::error::{Result, SimdexError};

pub use flat::FlatBackend;
pub use hnsw::HnswBackend;
pub use ivf::IvfBackend;
pub use lsh::LshBackend;

/// Contract every nearest-neighbor structure satisfies.
///
/// Positions are zero-based and assigned sequentially by `add`, matching
/// the identity map's assignment order. `search` returns `(position,
/// distance)` pairs in ascending distance order; distance-to-similarity
/// conversion is the caller's concern.
pub trait IndexBackend: Send + Sync + std::fmt::Debug {
    /// Stable kind name, matching [`BackendKind::name`].
    fn kind_name(&self) -> &'static str;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Number of physically stored vectors, including ones the caller
    /// has tombstoned.
    fn count(&self) -> usize;

    /// Whether this backend needs a training pass before `add`.
    fn requires_training(&self) -> bool {
        false
    }

    /// Whether training has completed. Always true for kinds without a
    /// training step.
    fn is_trained(&self) -> bool {
        true
    }

    /// Train internal structures (coarse quantizer, calibration) on a
    /// sample. No-op for kinds without a training step.
    fn train(&mut self, _vectors: &[Vec<f32>]) -> Result<()> {
        Ok(())
    }

    /// Append vectors, returning their assigned positions.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// Return up to `k` nearest candidates as `(position, distance)`,
    /// ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Recover the stored vector at `position`.
    fn reconstruct(&self, position: usize) -> Result<Vec<f32>>;

    /// Current runtime search breadth, or zero for kinds without one.
    fn search_breadth(&self) -> usize {
        0
    }

    /// Adjust runtime search breadth. No-op for the flat backend.
    fn set_search_breadth(&mut self, _breadth: usize) {}

    /// Rough in-memory footprint in bytes.
    fn estimated_memory(&self) -> usize {
        self.count() * self.dimension() * std::mem::size_of::<f32>()
    }

    /// Serialize this backend for the persistence bundle.
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Construct an empty backend for the configured kind.
pub fn create_backend(config: &IndexConfiguration) -> Result<Box<dyn IndexBackend>> {
    let backend: Box<dyn IndexBackend> = match config.backend {
        BackendKind::Flat => Box::new(FlatBackend::new(config.metric, config.dimension)),
        BackendKind::Ivf(params) => Box::new(IvfBackend::new(
            config.metric,
            config.dimension,
            params,
            false,
        )),
        BackendKind::IvfQuantized(params) => Box::new(IvfBackend::new(
            config.metric,
            config.dimension,
            params,
            true,
        )),
        BackendKind::Hnsw(params) => {
            Box::new(HnswBackend::new(config.metric, config.dimension, params))
        }
        BackendKind::Lsh(params) => {
            Box::new(LshBackend::new(config.metric, config.dimension, params))
        }
    };
    Ok(backend)
}

/// Deserialize persisted backend bytes according to the configured kind.
pub fn backend_from_bytes(
    config: &IndexConfiguration,
    bytes: &[u8],
) -> Result<Box<dyn IndexBackend>> {
    let backend: Box<dyn IndexBackend> = match config.backend {
        BackendKind::Flat => Box::new(bincode::deserialize::<FlatBackend>(bytes)?),
        BackendKind::Ivf(_) | BackendKind::IvfQuantized(_) => {
            Box::new(bincode::deserialize::<IvfBackend>(bytes)?)
        }
        BackendKind::Hnsw(_) => Box::new(bincode::deserialize::<HnswBackend>(bytes)?),
        BackendKind::Lsh(_) => Box::new(bincode::deserialize::<LshBackend>(bytes)?),
    };
    if backend.dimension() != config.dimension {
        return Err(SimdexError::persistence(format!(
            "backend dimension {} does not match configured dimension {}",
            backend.dimension(),
            config.dimension
        )));
    }
    Ok(backend)
}

/// Shared dimension check for backend `add`/`search` entry points.
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(SimdexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Sort `(position, distance)` candidates ascending and keep the first `k`.
pub(crate) fn rank_candidates(mut candidates: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HnswParams, IvfParams, LshParams};
    use crate::distance::DistanceMetric;

    #[test]
    fn test_factory_creates_each_kind() {
        for backend in [
            BackendKind::Flat,
            BackendKind::Ivf(IvfParams::default()),
            BackendKind::IvfQuantized(IvfParams::default()),
            BackendKind::Hnsw(HnswParams::default()),
            BackendKind::Lsh(LshParams::default()),
        ] {
            let config = IndexConfiguration::new(DistanceMetric::InnerProduct, backend, 8);
            let built = create_backend(&config).unwrap();
            assert_eq!(built.kind_name(), backend.name());
            assert_eq!(built.dimension(), 8);
            assert_eq!(built.count(), 0);
        }
    }

    #[test]
    fn test_from_bytes_rejects_dimension_drift() {
        let config = IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, 4);
        let backend = create_backend(&config).unwrap();
        let bytes = backend.to_bytes().unwrap();

        let other = IndexConfiguration::new(DistanceMetric::InnerProduct, BackendKind::Flat, 8);
        assert!(backend_from_bytes(&other, &bytes).is_err());
    }
}
