//! Final assembly of the results table into labeled CSV outputs.

use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::error::AggregationError;
use crate::scheduler::results::ResultsTable;
use crate::stats;

/// Labeled means/variances tables, rows in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub header: Vec<String>,
    pub means: Vec<Vec<String>>,
    pub variances: Vec<Vec<String>>,
}

/// What the aggregator wrote.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub means_path: PathBuf,
    pub variances_path: PathBuf,
    pub rows_written: usize,
    pub incomplete: Vec<usize>,
}

/// First header found among the given sample logs. Workers share one
/// logger layout, so any of them will do.
pub fn read_shared_header<'a, I>(logs: I) -> Result<Vec<String>, AggregationError>
where
    I: IntoIterator<Item = &'a Path>,
{
    logs.into_iter()
        .find_map(stats::read_header)
        .ok_or(AggregationError::NoHeader)
}

/// Label every populated row with its order key. Unpopulated rows are left
/// out and must be reported by the caller via [`ResultsTable::missing`].
pub fn assemble(header: Vec<String>, table: &ResultsTable) -> Result<Tables, AggregationError> {
    let data_columns = header.len().saturating_sub(1);
    let mut means: Vec<Vec<String>> = Vec::with_capacity(table.len());
    let mut variances: Vec<Vec<String>> = Vec::with_capacity(table.len());

    for (index, row) in table.rows().enumerate() {
        let Some(stats) = row else {
            continue;
        };
        for found in [stats.means.len(), stats.variances.len()] {
            if found != data_columns {
                return Err(AggregationError::SchemaMismatch {
                    index,
                    expected: data_columns,
                    found,
                });
            }
        }

        let key = stats.order_key.to_string();
        means.push(std::iter::once(key.clone()).chain(stats.formatted_means()).collect());
        variances.push(std::iter::once(key).chain(stats.formatted_variances()).collect());
    }

    Ok(Tables {
        header,
        means,
        variances,
    })
}

fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<(), AggregationError> {
    let fail = |message: String| AggregationError::Write {
        path: path.to_path_buf(),
        message,
    };

    let mut writer = Writer::from_path(path).map_err(|e| fail(e.to_string()))?;
    writer.write_record(header).map_err(|e| fail(e.to_string()))?;
    for row in rows {
        writer.write_record(row).map_err(|e| fail(e.to_string()))?;
    }
    writer.flush().map_err(|e| fail(e.to_string()))
}

/// Assemble both tables and write them. The header recorded in `table`
/// is used when present, otherwise the first readable worker log.
pub fn aggregate<'a, I>(
    logs: I,
    table: &ResultsTable,
    means_path: &Path,
    variances_path: &Path,
) -> Result<AggregateReport, AggregationError>
where
    I: IntoIterator<Item = &'a Path>,
{
    let header = match table.header() {
        Some(header) => header.to_vec(),
        None => read_shared_header(logs)?,
    };
    let tables = assemble(header, table)?;

    write_table(means_path, &tables.header, &tables.means)?;
    write_table(variances_path, &tables.header, &tables.variances)?;

    let incomplete = table.missing();
    info!(
        rows = tables.means.len(),
        incomplete = incomplete.len(),
        means = %means_path.display(),
        variances = %variances_path.display(),
        "tables written"
    );

    Ok(AggregateReport {
        means_path: means_path.to_path_buf(),
        variances_path: variances_path.to_path_buf(),
        rows_written: tables.means.len(),
        incomplete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chkpt_core::SampleStatistics;

    fn header() -> Vec<String> {
        ["sample", "a", "b"].map(String::from).to_vec()
    }

    fn table() -> ResultsTable {
        let table = ResultsTable::new(3);
        table
            .publish(SampleStatistics {
                work_item_index: 0,
                order_key: 0,
                means: vec![2.0, 4.0],
                variances: vec![2.0, 2.0],
            })
            .unwrap();
        table
            .publish(SampleStatistics {
                work_item_index: 2,
                order_key: 10,
                means: vec![0.5, -1.0],
                variances: vec![0.25, 0.0],
            })
            .unwrap();
        table
    }

    #[test]
    fn assemble_labels_rows_and_skips_gaps() {
        let tables = assemble(header(), &table()).unwrap();
        assert_eq!(tables.means.len(), 2);
        assert_eq!(
            tables.means[0],
            vec!["0", "2.000000000000000", "4.000000000000000"]
        );
        assert_eq!(
            tables.variances[1],
            vec!["10", "0.250000000000000", "0.000000000000000"]
        );
    }

    #[test]
    fn schema_mismatch_is_reported() {
        let narrow = ["sample", "a"].map(String::from).to_vec();
        let err = assemble(narrow, &table()).unwrap_err();
        assert!(matches!(err, AggregationError::SchemaMismatch { index: 0, expected: 1, found: 2 }));
    }

    #[test]
    fn header_from_first_available_log() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("temp-samples-0.csv");
        let present = dir.path().join("temp-samples-1.csv");
        std::fs::write(&present, "sample\ta\tb\n0\t1\t2\n").unwrap();

        let header = read_shared_header([missing.as_path(), present.as_path()]).unwrap();
        assert_eq!(header, vec!["sample", "a", "b"]);

        let err = read_shared_header([missing.as_path()]).unwrap_err();
        assert!(matches!(err, AggregationError::NoHeader));
    }

    #[test]
    fn recorded_header_needs_no_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = table();
        assert!(table.record_header(header()));
        let means = dir.path().join("means.csv");
        let variances = dir.path().join("variances.csv");

        let gone = dir.path().join("temp-samples-0.csv");
        let report = aggregate([gone.as_path()], &table, &means, &variances).unwrap();
        assert_eq!(report.rows_written, 2);
        assert!(std::fs::read_to_string(&means).unwrap().starts_with("sample,a,b\n0,"));
    }

    #[test]
    fn writes_both_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("temp-samples-0.csv");
        std::fs::write(&log, "sample\ta\tb\n").unwrap();
        let means = dir.path().join("means.csv");
        let variances = dir.path().join("variances.csv");

        let report = aggregate([log.as_path()], &table(), &means, &variances).unwrap();
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.incomplete, vec![1]);

        let text = std::fs::read_to_string(&means).unwrap();
        assert_eq!(
            text,
            "sample,a,b\n0,2.000000000000000,4.000000000000000\n10,0.500000000000000,-1.000000000000000\n"
        );
        let text = std::fs::read_to_string(&variances).unwrap();
        assert!(text.starts_with("sample,a,b\n0,2.000000000000000,2.000000000000000\n"));
    }
}
