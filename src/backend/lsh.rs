//! Random-hyperplane hashing backend.
//!
//! Each table hashes a vector to a bit signature (one bit per random
//! hyperplane). A query probes its own bucket plus a bounded number of
//! single-bit-flip neighbor buckets per table, then reranks candidates
//! exactly. Sparse candidate sets fall back to an exact scan so small
//! collections never lose recall.

use ahash::{AHashMap, AHashSet};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{IndexBackend, check_dimension, rank_candidates};
use crate::config::LshParams;
use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// Hashing backend. Hyperplanes are drawn at construction; there is no
/// training step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshBackend {
    metric: DistanceMetric,
    dimension: usize,
    params: LshParams,
    /// `planes[table][bit]` is one hyperplane normal.
    planes: Vec<Vec<Vec<f32>>>,
    tables: Vec<AHashMap<u64, Vec<usize>>>,
    vectors: Vec<Vec<f32>>,
    /// Single-bit-flip probes per table.
    probe_flips: usize,
}

impl LshBackend {
    /// Create an empty hashing backend with freshly drawn hyperplanes.
    pub fn new(metric: DistanceMetric, dimension: usize, params: LshParams) -> Self {
        let mut rng = rand::rng();
        let planes = (0..params.n_tables)
            .map(|_| {
                (0..params.n_bits)
                    .map(|_| {
                        (0..dimension)
                            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Self {
            metric,
            dimension,
            params,
            planes,
            tables: vec![AHashMap::new(); params.n_tables],
            vectors: Vec::new(),
            probe_flips: 2,
        }
    }

    fn signature(&self, table: usize, vector: &[f32]) -> u64 {
        let mut bits = 0u64;
        for (bit, plane) in self.planes[table].iter().enumerate() {
            let dot: f32 = plane.iter().zip(vector.iter()).map(|(p, v)| p * v).sum();
            if dot >= 0.0 {
                bits |= 1 << bit;
            }
        }
        bits
    }

    fn gather_candidates(&self, query: &[f32]) -> AHashSet<usize> {
        let mut candidates = AHashSet::new();
        for table in 0..self.tables.len() {
            let bucket = self.signature(table, query);
            if let Some(positions) = self.tables[table].get(&bucket) {
                candidates.extend(positions.iter().copied());
            }
            for bit in 0..self.params.n_bits.min(self.probe_flips) {
                let probe = bucket ^ (1 << bit);
                if let Some(positions) = self.tables[table].get(&probe) {
                    candidates.extend(positions.iter().copied());
                }
            }
        }
        candidates
    }
}

impl IndexBackend for LshBackend {
    fn kind_name(&self) -> &'static str {
        "lsh"
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
        let mut positions = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let position = self.vectors.len();
            for table in 0..self.tables.len() {
                let bucket = self.signature(table, vector);
                self.tables[table].entry(bucket).or_default().push(position);
            }
            self.vectors.push(vector.clone());
            positions.push(position);
        }
        Ok(positions)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.gather_candidates(query);
        let exact: Vec<(usize, f32)> = if candidates.len() < k {
            // Too few bucket hits to fill k results; scan everything.
            (0..self.vectors.len())
                .map(|position| {
                    let d = self
                        .metric
                        .distance(query, &self.vectors[position])
                        .unwrap_or(f32::INFINITY);
                    (position, d)
                })
                .collect()
        } else {
            candidates
                .into_iter()
                .map(|position| {
                    let d = self
                        .metric
                        .distance(query, &self.vectors[position])
                        .unwrap_or(f32::INFINITY);
                    (position, d)
                })
                .collect()
        };
        Ok(rank_candidates(exact, k))
    }

    fn reconstruct(&self, position: usize) -> Result<Vec<f32>> {
        self.vectors
            .get(position)
            .cloned()
            .ok_or_else(|| SimdexError::backend(format!("position {position} out of range")))
    }

    fn search_breadth(&self) -> usize {
        self.probe_flips
    }

    fn set_search_breadth(&mut self, breadth: usize) {
        self.probe_flips = breadth.min(self.params.n_bits);
    }

    fn estimated_memory(&self) -> usize {
        let vectors = self.vectors.len() * self.dimension * std::mem::size_of::<f32>();
        let planes =
            self.params.n_tables * self.params.n_bits * self.dimension * std::mem::size_of::<f32>();
        let buckets: usize = self
            .tables
            .iter()
            .flat_map(|t| t.values())
            .map(|b| b.len() * std::mem::size_of::<usize>())
            .sum();
        vectors + planes + buckets
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
