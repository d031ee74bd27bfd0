use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

/// Outcome counts of one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Items received from the feed
    pub total: usize,
    /// Records whose price was written
    pub updated: usize,
    /// Unusable prices and store failures while writing
    pub errors: usize,
    /// Items missing a symbol or price
    pub skipped: usize,
    /// Well-formed items with no matching record
    pub unmatched: usize,
    pub completed_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl Default for CycleReport {
    fn default() -> Self {
        Self {
            total: 0,
            updated: 0,
            errors: 0,
            skipped: 0,
            unmatched: 0,
            completed_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }
}

impl CycleReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total,
            updated = self.updated,
            errors = self.errors,
            skipped = self.skipped,
            unmatched = self.unmatched,
            completed_at = %self.completed_at.to_rfc3339(),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "currency prices updated"
        );
    }
}

