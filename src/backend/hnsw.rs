//! Layered small-world graph backend.
//!
//! Classic HNSW construction: each vector draws a geometric level, links
//! bidirectionally to its nearest neighbors per layer, and over-full
//! adjacency lists are pruned back to the closest links. Search descends
//! greedily through the upper layers and runs a best-first expansion with
//! an `ef_search` candidate list on the base layer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::AHashSet;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{IndexBackend, check_dimension};
use crate::config::HnswParams;
use crate::distance::DistanceMetric;
use crate::error::{Result, SimdexError};

/// Hard cap on drawn levels.
const MAX_LEVEL: usize = 16;

#[derive(PartialEq)]
struct DistEntry {
    distance: f32,
    position: usize,
}

impl Eq for DistEntry {}

impl Ord for DistEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for DistEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Graph backend. No training step; search breadth (`ef_search`) is
/// adjustable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswBackend {
    metric: DistanceMetric,
    dimension: usize,
    params: HnswParams,
    ef_search: usize,
    level_mult: f64,
    entry_point: Option<usize>,
    max_level: usize,
    vectors: Vec<Vec<f32>>,
    /// `nodes[position][level]` holds neighbor positions; level 0 is the
    /// base layer.
    nodes: Vec<Vec<Vec<usize>>>,
}

impl HnswBackend {
    /// Create an empty graph backend.
    pub fn new(metric: DistanceMetric, dimension: usize, params: HnswParams) -> Self {
        Self {
            metric,
            dimension,
            params,
            ef_search: params.ef_search,
            level_mult: 1.0 / (params.m.max(2) as f64).ln(),
            entry_point: None,
            max_level: 0,
            vectors: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn distance(&self, query: &[f32], position: usize) -> f32 {
        self.metric
            .distance(query, &self.vectors[position])
            .unwrap_or(f32::INFINITY)
    }

    fn neighbors(&self, position: usize, level: usize) -> &[usize] {
        self.nodes[position]
            .get(level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn draw_level(&self) -> usize {
        let mut rng = rand::rng();
        let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        (((-u.ln()) * self.level_mult) as usize).min(MAX_LEVEL)
    }

    /// Move greedily toward the query along one layer.
    fn greedy_descend(&self, query: &[f32], mut entry: usize, level: usize) -> usize {
        let mut best = self.distance(query, entry);
        loop {
            let mut changed = false;
            for &neighbor in self.neighbors(entry, level) {
                let d = self.distance(query, neighbor);
                if d < best {
                    best = d;
                    entry = neighbor;
                    changed = true;
                }
            }
            if !changed {
                return entry;
            }
        }
    }

    /// Best-first expansion at one layer with a bounded candidate list.
    /// Returns up to `ef` candidates ascending by distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry: usize,
        ef: usize,
        level: usize,
    ) -> Vec<(usize, f32)> {
        let ef = ef.max(1);
        let mut visited: AHashSet<usize> = AHashSet::new();
        visited.insert(entry);

        let entry_distance = self.distance(query, entry);
        let mut candidates = BinaryHeap::new();
        candidates.push(Reverse(DistEntry {
            distance: entry_distance,
            position: entry,
        }));
        // Max-heap of current results; the root is the furthest kept hit.
        let mut results: BinaryHeap<DistEntry> = BinaryHeap::new();
        results.push(DistEntry {
            distance: entry_distance,
            position: entry,
        });

        while let Some(Reverse(current)) = candidates.pop() {
            let furthest = results
                .peek()
                .map(|e| e.distance)
                .unwrap_or(f32::INFINITY);
            if current.distance > furthest && results.len() >= ef {
                break;
            }

            for &neighbor in self.neighbors(current.position, level) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.distance(query, neighbor);
                let furthest = results
                    .peek()
                    .map(|e| e.distance)
                    .unwrap_or(f32::INFINITY);
                if results.len() < ef || d < furthest {
                    candidates.push(Reverse(DistEntry {
                        distance: d,
                        position: neighbor,
                    }));
                    results.push(DistEntry {
                        distance: d,
                        position: neighbor,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(usize, f32)> = results
            .into_iter()
            .map(|e| (e.position, e.distance))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    fn prune_neighbors(&mut self, position: usize, level: usize, max_links: usize) {
        let base = self.vectors[position].clone();
        let mut ranked: Vec<(usize, f32)> = self.nodes[position][level]
            .iter()
            .map(|&n| {
                let d = self
                    .metric
                    .distance(&base, &self.vectors[n])
                    .unwrap_or(f32::INFINITY);
                (n, d)
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(max_links);
        self.nodes[position][level] = ranked.into_iter().map(|(n, _)| n).collect();
    }

    fn insert(&mut self, vector: Vec<f32>) -> usize {
        let position = self.vectors.len();
        let level = self.draw_level();
        self.vectors.push(vector);
        self.nodes.push(vec![Vec::new(); level + 1]);

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(position);
            self.max_level = level;
            return position;
        };

        let query = self.vectors[position].clone();
        for l in ((level + 1)..=self.max_level).rev() {
            entry = self.greedy_descend(&query, entry, l);
        }

        for l in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(&query, entry, self.params.ef_construction, l);
            if let Some(&(best, _)) = candidates.first() {
                entry = best;
            }
            let max_links = if l == 0 { self.params.m * 2 } else { self.params.m };
            let selected: Vec<usize> = candidates
                .iter()
                .take(self.params.m)
                .map(|&(p, _)| p)
                .collect();
            self.nodes[position][l] = selected.clone();
            for &neighbor in &selected {
                self.nodes[neighbor][l].push(position);
                if self.nodes[neighbor][l].len() > max_links {
                    self.prune_neighbors(neighbor, l, max_links);
                }
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(position);
        }
        position
    }
}

impl IndexBackend for HnswBackend {
    fn kind_name(&self) -> &'static str {
        "hnsw"
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
        Ok(vectors
            .iter()
            .map(|v| self.insert(v.clone()))
            .collect())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        let Some(mut entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        for level in (1..=self.max_level).rev() {
            entry = self.greedy_descend(query, entry, level);
        }
        let ef = self.ef_search.max(k);
        let mut out = self.search_layer(query, entry, ef, 0);
        out.truncate(k);
        Ok(out)
    }

    fn reconstruct(&self, position: usize) -> Result<Vec<f32>> {
        self.vectors
            .get(position)
            .cloned()
            .ok_or_else(|| SimdexError::backend(format!("position {position} out of range")))
    }

    fn search_breadth(&self) -> usize {
        self.ef_search
    }

    fn set_search_breadth(&mut self, breadth: usize) {
        self.ef_search = breadth.max(1);
    }

    fn estimated_memory(&self) -> usize {
        let vectors = self.vectors.len() * self.dimension * std::mem::size_of::<f32>();
        let links: usize = self
            .nodes
            .iter()
            .flat_map(|layers| layers.iter())
            .map(|neighbors| neighbors.len() * std::mem::size_of::<usize>())
            .sum();
        vectors + links
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> HnswBackend {
        let params = HnswParams {
            m: 8,
            ef_construction: 32,
            ef_search: 16,
        };
        HnswBackend::new(DistanceMetric::Euclidean, 2, params)
    }

    #[test]
    fn test_empty_graph_returns_nothing() {
        let backend = small_graph();
        assert!(backend.search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_exact_recall_on_small_graph() {
        let mut backend = small_graph();
        let vectors: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32, 0.0]).collect();
        backend.add(&vectors).unwrap();

        let results = backend.search(&[20.2, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 20);
        let found: Vec<usize> = results.iter().map(|&(p, _)| p).collect();
        assert!(found.contains(&21));
        assert!(found.contains(&19) || found.contains(&21));
    }

    #[test]
    fn test_positions_are_sequential() {
        let mut backend = small_graph();
        let positions = backend
            .add(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]])
            .unwrap();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(backend.count(), 3);
    }

    #[test]
    fn test_adjacency_respects_link_caps() {
        let mut backend = small_graph();
        let vectors: Vec<Vec<f32>> = (0..100)
            .map(|i| vec![(i % 10) as f32, (i / 10) as f32])
            .collect();
        backend.add(&vectors).unwrap();
        for layers in &backend.nodes {
            if let Some(base) = layers.first() {
                assert!(base.len() <= backend.params.m * 2);
            }
            for upper in layers.iter().skip(1) {
                assert!(upper.len() <= backend.params.m);
            }
        }
    }

    #[test]
    fn test_serde_round_trip_preserves_results() {
        let mut backend = small_graph();
        let vectors: Vec<Vec<f32>> = (0..30).map(|i| vec![i as f32, 1.0]).collect();
        backend.add(&vectors).unwrap();
        let bytes = backend.to_bytes().unwrap();
        let back: HnswBackend = bincode::deserialize(&bytes).unwrap();
        assert_eq!(
            back.search(&[5.1, 1.0], 2).unwrap(),
            backend.search(&[5.1, 1.0], 2).unwrap()
        );
    }
}
