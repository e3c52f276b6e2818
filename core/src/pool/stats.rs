//! Pool slot statistics

use std::time::Duration;

/// Tallies kept by each slot, merged across the pool on shutdown
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PoolStats {
    /// Calls that returned successfully
    pub completed: usize,

    /// Calls whose client reported an error
    pub errors: usize,

    /// Prompt tokens sent
    pub input_tokens: usize,

    /// Time slots spent inside client calls
    pub busy_time: Duration,

    /// Requests still running when the pool shut down
    pub abandoned: usize,
}

impl PoolStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total number of finished calls (completed + errors)
    pub fn total_requests(&self) -> usize {
        self.completed + self.errors
    }

    /// Fraction of finished calls that failed (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests() == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_requests() as f64
        }
    }

    /// Record a successful call
    pub fn record_success(&mut self, input_tokens: usize, elapsed: Duration) {
        self.completed += 1;
        self.input_tokens += input_tokens;
        self.busy_time += elapsed;
    }

    /// Record a failed call
    pub fn record_error(&mut self, elapsed: Duration) {
        self.errors += 1;
        self.busy_time += elapsed;
    }

    /// Merge stats from another slot
    pub fn merge(&mut self, other: &PoolStats) {
        self.completed += other.completed;
        self.errors += other.errors;
        self.input_tokens += other.input_tokens;
        self.busy_time += other.busy_time;
        self.abandoned += other.abandoned;
    }
}
