//! Mutation-driven rebuild scheduling.
//!
//! The scheduler counts mutations (adds and removals) and flags when the
//! configured threshold is crossed. The manager decides what a rebuild
//! means for the active backend kind; the scheduler only tracks when one
//! is due and guards against re-entry.

use serde::{Deserialize, Serialize};

/// Lower bound for the recommended search breadth after a rebuild.
const MIN_BREADTH: usize = 16;
/// Upper bound for the recommended search breadth after a rebuild.
const MAX_BREADTH: usize = 256;

/// Whether a rebuild is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationState {
    Idle,
    Optimizing,
}

/// Decides when the backend should be rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationScheduler {
    threshold: usize,
    mutations: usize,
    state: OptimizationState,
}

impl OptimizationScheduler {
    /// A threshold of zero disables scheduling entirely.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            mutations: 0,
            state: OptimizationState::Idle,
        }
    }

    /// Count one add or removal.
    pub fn record_mutation(&mut self) {
        self.mutations += 1;
    }

    /// Mutations accumulated since the last successful rebuild.
    pub fn pending_mutations(&self) -> usize {
        self.mutations
    }

    pub fn state(&self) -> OptimizationState {
        self.state
    }

    /// Whether enough mutations accumulated to warrant a rebuild. Never
    /// true while a rebuild is already running.
    pub fn is_due(&self) -> bool {
        self.threshold > 0
            && self.state == OptimizationState::Idle
            && self.mutations >= self.threshold
    }

    /// Mark a rebuild as started. Returns false when one is already
    /// running, so concurrent triggers collapse to a single pass.
    pub fn begin(&mut self) -> bool {
        if self.state == OptimizationState::Optimizing {
            return false;
        }
        self.state = OptimizationState::Optimizing;
        true
    }

    /// Mark the running rebuild as finished. The mutation counter resets
    /// only on success so a failed pass retries on the next trigger.
    pub fn finish(&mut self, success: bool) {
        self.state = OptimizationState::Idle;
        if success {
            self.mutations = 0;
        }
    }

    /// Search breadth suited to the collection size, used to retune
    /// approximate backends after a rebuild.
    pub fn recommended_breadth(count: usize) -> usize {
        ((count as f64).sqrt() as usize).clamp(MIN_BREADTH, MAX_BREADTH)
    }
}
