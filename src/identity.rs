//! Bidirectional mapping between external identifiers and backend
//! positions.
//!
//! `assign` is the only way new positions are created, and positions are
//! assigned in strictly increasing order starting at zero, matching the
//! order in which vectors are physically appended to the backend. That
//! ordering equivalence is what lets integer-indexed backend results be
//! translated back to external identifiers.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimdexError};

/// Identifier bookkeeping for the index.
///
/// Removal tombstones a position rather than compacting; tombstoned
/// positions are reclaimed on the next rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityMap {
    forward: AHashMap<String, usize>,
    /// Position-ordered identifiers, including tombstoned ones.
    reverse: Vec<String>,
    tombstones: AHashSet<usize>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next position to `id`.
    pub fn assign(&mut self, id: &str) -> Result<usize> {
        if self.forward.contains_key(id) {
            return Err(SimdexError::DuplicateIdentifier(id.to_string()));
        }
        let position = self.reverse.len();
        self.forward.insert(id.to_string(), position);
        self.reverse.push(id.to_string());
        Ok(position)
    }

    /// Look up the position of a live identifier.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.forward.get(id).copied()
    }

    /// Look up the identifier at a position. Returns `None` for
    /// tombstoned or out-of-range positions.
    pub fn identifier_of(&self, position: usize) -> Option<&str> {
        if self.tombstones.contains(&position) {
            return None;
        }
        self.reverse.get(position).map(|s| s.as_str())
    }

    /// Tombstone an identifier, returning its former position.
    pub fn remove(&mut self, id: &str) -> Result<usize> {
        let position = self
            .forward
            .remove(id)
            .ok_or_else(|| SimdexError::not_found(id))?;
        self.tombstones.insert(position);
        Ok(position)
    }

    /// Live positions in ascending order.
    pub fn positions(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = self.forward.values().copied().collect();
        positions.sort_unstable();
        positions
    }

    /// Number of live identifiers.
    pub fn live_count(&self) -> usize {
        self.forward.len()
    }

    /// Number of positions ever assigned, including tombstones.
    pub fn assigned_count(&self) -> usize {
        self.reverse.len()
    }

    /// Number of tombstoned positions.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Whether a position has been tombstoned.
    pub fn is_tombstoned(&self, position: usize) -> bool {
        self.tombstones.contains(&position)
    }

    /// Drop every assignment at or beyond `len`, keeping the
    /// earliest-assigned identifiers. Used by consistency repair.
    pub fn truncate(&mut self, len: usize) -> usize {
        if len >= self.reverse.len() {
            return 0;
        }
        let dropped = self.reverse.len() - len;
        for position in len..self.reverse.len() {
            let id = &self.reverse[position];
            if self.forward.get(id) == Some(&position) {
                self.forward.remove(id);
            }
            self.tombstones.remove(&position);
        }
        self.reverse.truncate(len);
        dropped
    }

    /// Pad with tombstoned placeholder assignments until `len` positions
    /// exist, so the assigned count matches a backend holding orphan
    /// vectors. Used by consistency repair.
    pub fn pad_to(&mut self, len: usize) -> usize {
        let mut added = 0;
        while self.reverse.len() < len {
            let position = self.reverse.len();
            self.reverse.push(format!("__orphan_{position}"));
            self.tombstones.insert(position);
            added += 1;
        }
        added
    }

    /// Tombstone a position directly, regardless of its identifier.
    /// Used by consistency repair on duplicate assignments.
    pub fn tombstone_position(&mut self, position: usize) {
        if let Some(id) = self.reverse.get(position) {
            if self.forward.get(id) == Some(&position) {
                self.forward.remove(id);
            }
        }
        self.tombstones.insert(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_sequential_from_zero() {
        let mut map = IdentityMap::new();
        assert_eq!(map.assign("a").unwrap(), 0);
        assert_eq!(map.assign("b").unwrap(), 1);
        assert_eq!(map.assign("c").unwrap(), 2);
        assert_eq!(map.positions(), vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_assignment_rejected() {
        let mut map = IdentityMap::new();
        map.assign("a").unwrap();
        match map.assign("a") {
            Err(SimdexError::DuplicateIdentifier(id)) => assert_eq!(id, "a"),
            other => panic!("expected DuplicateIdentifier, got {other:?}"),
        }
        assert_eq!(map.live_count(), 1);
    }

    #[test]
    fn test_remove_tombstones_without_compacting() {
        let mut map = IdentityMap::new();
        map.assign("a").unwrap();
        map.assign("b").unwrap();
        let position = map.remove("a").unwrap();
        assert_eq!(position, 0);
        assert_eq!(map.live_count(), 1);
        assert_eq!(map.assigned_count(), 2);
        assert!(map.identifier_of(0).is_none());
        assert_eq!(map.identifier_of(1), Some("b"));
        // New assignments continue after the tombstone.
        assert_eq!(map.assign("c").unwrap(), 2);
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let mut map = IdentityMap::new();
        assert!(matches!(map.remove("ghost"), Err(SimdexError::NotFound(_))));
    }

    #[test]
    fn test_truncate_keeps_earliest() {
        let mut map = IdentityMap::new();
        for id in ["a", "b", "c", "d"] {
            map.assign(id).unwrap();
        }
        let dropped = map.truncate(2);
        assert_eq!(dropped, 2);
        assert_eq!(map.assigned_count(), 2);
        assert_eq!(map.position_of("a"), Some(0));
        assert_eq!(map.position_of("c"), None);
    }

    #[test]
    fn test_pad_to_adds_tombstoned_placeholders() {
        let mut map = IdentityMap::new();
        map.assign("a").unwrap();
        let added = map.pad_to(3);
        assert_eq!(added, 2);
        assert_eq!(map.assigned_count(), 3);
        assert_eq!(map.live_count(), 1);
        assert!(map.identifier_of(1).is_none());
        assert!(map.identifier_of(2).is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut map = IdentityMap::new();
        map.assign("a").unwrap();
        map.assign("b").unwrap();
        map.remove("a").unwrap();
        let bytes = bincode::serialize(&map).unwrap();
        let back: IdentityMap = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.live_count(), 1);
        assert_eq!(back.position_of("b"), Some(1));
        assert!(back.is_tombstoned(0));
    }
}
