use serde::Serialize;

use crate::aggregate::AggregateReport;

use super::metrics::RunMetrics;

/// A work item whose row was never populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteRow {
    pub index: usize,
    pub order_key: u64,
    pub source_identifier: String,
    /// Failure recorded by the worker, if it got that far.
    pub error: Option<String>,
}

/// Outcome of a full sampling run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub items: usize,
    pub workers: usize,
    pub metrics: RunMetrics,
    pub aggregate: AggregateReport,
    pub incomplete: Vec<IncompleteRow>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }

    /// One line per incomplete row, for the final summary.
    pub fn incomplete_summary(&self) -> Vec<String> {
        self.incomplete
            .iter()
            .map(|row| {
                format!(
                    "row {} (order key {}, {}): {}",
                    row.index,
                    row.order_key,
                    row.source_identifier,
                    row.error.as_deref().unwrap_or("no result recorded")
                )
            })
            .collect()
    }
}
