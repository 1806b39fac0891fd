use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One work item that did not produce a row.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub order_key: u64,
    pub worker: usize,
    pub error: String,
}

/// Operational counters for one sampling run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub started_at: DateTime<Utc>,
    /// Items completed per worker id.
    pub completed: BTreeMap<usize, u64>,
    /// Items failed per worker id.
    pub failed: BTreeMap<usize, u64>,
    /// Average wall time of a successful item.
    pub avg_item_duration: Duration,
    pub failures: Vec<ItemFailure>,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
            avg_item_duration: Duration::ZERO,
            failures: Vec::new(),
        }
    }
}

impl RunMetrics {
    /// Record a successful item.
    pub fn record_success(&mut self, worker: usize, duration: Duration) {
        *self.completed.entry(worker).or_default() += 1;
        let count = self.items_completed();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_item_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_item_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    /// Record an item that left its row unpopulated.
    pub fn record_failure(&mut self, failure: ItemFailure) {
        *self.failed.entry(failure.worker).or_default() += 1;
        self.failures.push(failure);
    }

    pub fn items_completed(&self) -> u64 {
        self.completed.values().sum()
    }

    pub fn items_failed(&self) -> u64 {
        self.failed.values().sum()
    }
}
