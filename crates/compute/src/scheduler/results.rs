use std::sync::OnceLock;

use chkpt_core::SampleStatistics;

use crate::error::PublishError;

/// Pre-sized, write-once table of per-item statistics.
///
/// Row `i` holds the means and variances of work item `i`. Each row is set
/// at most once; concurrent writers to distinct rows never contend because
/// the work queue hands every index to a single worker.
///
/// The sample-log header of the first published row is kept with the
/// table, so the column labels survive even if every log file is later
/// removed.
#[derive(Debug)]
pub struct ResultsTable {
    rows: Vec<OnceLock<SampleStatistics>>,
    header: OnceLock<Vec<String>>,
}

impl ResultsTable {
    pub fn new(len: usize) -> Self {
        Self {
            rows: (0..len).map(|_| OnceLock::new()).collect(),
            header: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Store `stats` at row `stats.work_item_index`.
    pub fn publish(&self, stats: SampleStatistics) -> Result<(), PublishError> {
        let index = stats.work_item_index;
        let slot = self.rows.get(index).ok_or(PublishError::OutOfRange(index))?;
        slot.set(stats).map_err(|_| PublishError::AlreadyPopulated(index))
    }

    /// Keep `header` unless one was already recorded. Returns `false` when
    /// it differs from the recorded one.
    pub fn record_header(&self, header: Vec<String>) -> bool {
        *self.header.get_or_init(|| header.clone()) == header
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.get().map(Vec::as_slice)
    }

    pub fn get(&self, index: usize) -> Option<&SampleStatistics> {
        self.rows.get(index).and_then(OnceLock::get)
    }

    /// Rows in index order; `None` marks an unpopulated row.
    pub fn rows(&self) -> impl Iterator<Item = Option<&SampleStatistics>> {
        self.rows.iter().map(OnceLock::get)
    }

    /// Indices of rows that were never populated.
    pub fn missing(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.get().is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|slot| slot.get().is_some())
    }
}
