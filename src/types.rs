//! Core record and result types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored embedding and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Caller-supplied external identifier, unique within the index.
    pub id: String,
    /// Backend position, assigned sequentially and stable until a rebuild.
    pub position: usize,
    /// Insertion timestamp.
    pub inserted_at: DateTime<Utc>,
    /// Caller-supplied opaque metadata.
    pub metadata: HashMap<String, String>,
    /// L2 norm of the vector as supplied, kept for diagnostics.
    pub norm: f32,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// External identifier of the matched vector.
    pub id: String,
    /// Similarity score; higher is more similar regardless of metric.
    pub score: f32,
}

/// An ordered sequence of hits, sorted by descending similarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether there are no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The hit identifiers in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

/// Per-query search parameters.
///
/// These are part of the cache key: two searches with different parameters
/// never share a cached result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Override the backend's search breadth (`n_probe` for inverted-file
    /// backends, `ef_search` for the graph backend, probe width for
    /// hashing) for this query only.
    pub breadth: Option<usize>,
}
