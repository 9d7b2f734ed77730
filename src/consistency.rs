//! Cross-checks between the backend and the identifier bookkeeping.
//!
//! The backend physically stores one vector per assigned position,
//! tombstoned or not, so the assigned count and the backend count must
//! agree exactly. Validation reports every violation it finds; repair
//! applies the smallest correction that restores the invariants, and
//! running repair twice is a no-op the second time.

use ahash::{AHashMap, AHashSet};

use crate::backend::IndexBackend;
use crate::identity::IdentityMap;
use crate::types::VectorRecord;

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Human-readable description of each violation found.
    pub issues: Vec<String>,
}

impl ValidationReport {
    /// Whether the index passed every check.
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every invariant between `backend`, `identity`, and `records`.
pub fn validate(
    backend: &dyn IndexBackend,
    identity: &IdentityMap,
    records: &AHashMap<String, VectorRecord>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let assigned = identity.assigned_count();
    let stored = backend.count();
    if assigned != stored {
        report.issues.push(format!(
            "assigned position count {assigned} does not match backend vector count {stored}"
        ));
    }

    let mut seen: AHashSet<usize> = AHashSet::new();
    for position in identity.positions() {
        if position >= stored {
            report.issues.push(format!(
                "live position {position} is beyond backend vector count {stored}"
            ));
        }
        if !seen.insert(position) {
            report
                .issues
                .push(format!("position {position} is assigned to multiple identifiers"));
        }
    }

    for (id, record) in records {
        match identity.position_of(id) {
            Some(position) if position == record.position => {}
            Some(position) => report.issues.push(format!(
                "record for '{id}' claims position {} but identity says {position}",
                record.position
            )),
            None => report
                .issues
                .push(format!("record exists for '{id}' which is not a live identifier")),
        }
    }
    for position in identity.positions() {
        if let Some(id) = identity.identifier_of(position)
            && !records.contains_key(id)
        {
            report
                .issues
                .push(format!("live identifier '{id}' has no record"));
        }
    }

    report
}

/// Restore the invariants `validate` checks, returning a description of
/// each action taken. Safe to call on a consistent index; it then does
/// nothing.
pub fn repair(
    backend: &dyn IndexBackend,
    identity: &mut IdentityMap,
    records: &mut AHashMap<String, VectorRecord>,
) -> Vec<String> {
    let mut actions = Vec::new();
    let stored = backend.count();

    if identity.assigned_count() > stored {
        let dropped = identity.truncate(stored);
        actions.push(format!(
            "dropped {dropped} identifier assignments beyond backend vector count {stored}"
        ));
    } else if identity.assigned_count() < stored {
        let added = identity.pad_to(stored);
        actions.push(format!(
            "tombstoned {added} orphan backend positions with placeholder identifiers"
        ));
    }

    // Keep the earliest identifier per position; tombstone later claimants.
    let mut claimed: AHashMap<usize, usize> = AHashMap::new();
    let mut duplicates: Vec<usize> = Vec::new();
    for position in identity.positions() {
        let count = claimed.entry(position).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(position);
        }
    }
    for position in duplicates {
        identity.tombstone_position(position);
        actions.push(format!(
            "tombstoned position {position} claimed by multiple identifiers"
        ));
    }

    let live: AHashSet<String> = identity
        .positions()
        .iter()
        .filter_map(|&p| identity.identifier_of(p).map(str::to_string))
        .collect();
    let stale: Vec<String> = records
        .keys()
        .filter(|id| !live.contains(*id))
        .cloned()
        .collect();
    for id in stale {
        records.remove(&id);
        actions.push(format!("dropped record for stale identifier '{id}'"));
    }
    for id in &live {
        let position = match identity.position_of(id) {
            Some(p) => p,
            None => continue,
        };
        let needs_rebuild = records
            .get(id)
            .map(|r| r.position != position)
            .unwrap_or(true);
        if needs_rebuild {
            let norm = backend
                .reconstruct(position)
                .map(|v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
                .unwrap_or(0.0);
            records.insert(
                id.clone(),
                VectorRecord {
                    id: id.clone(),
                    position,
                    inserted_at: chrono::Utc::now(),
                    metadata: Default::default(),
                    norm,
                },
            );
            actions.push(format!("rebuilt record for '{id}' at position {position}"));
        }
    }

    actions
}
