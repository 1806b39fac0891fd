use serde::{Deserialize, Serialize};

/// Fractional digits used when rendering a statistic.
pub const STATISTIC_PRECISION: usize = 15;

/// One unit of sampling work, tied to one checkpoint and one output row.
///
/// `index` is assigned after sorting by `order_key` and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: usize,
    /// Archive member name or loose file path.
    pub source_identifier: String,
    pub order_key: u64,
}

/// Per-column summary of one sample log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub work_item_index: usize,
    pub order_key: u64,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

impl SampleStatistics {
    pub fn formatted_means(&self) -> Vec<String> {
        self.means.iter().copied().map(format_statistic).collect()
    }

    pub fn formatted_variances(&self) -> Vec<String> {
        self.variances.iter().copied().map(format_statistic).collect()
    }
}

/// Render a statistic with a fixed number of fractional digits.
pub fn format_statistic(value: f64) -> String {
    format!("{:.*}", STATISTIC_PRECISION, value)
}
