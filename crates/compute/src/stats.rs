//! Sample-log parsing and per-column summary statistics.
//!
//! A sample log is tab-separated. Its first line is a header whose first
//! token is [`HEADER_MARKER`]; every following line holds a sample counter
//! and one numeric value per header column.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SampleLogError;

pub const HEADER_MARKER: &str = "sample";
pub const DELIMITER: char = '\t';

/// Means and sample variances of every numeric column of one log.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    /// Full header, including the leading sample-counter column.
    pub header: Vec<String>,
    pub samples: usize,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

fn is_header(line: &str) -> bool {
    line.split(DELIMITER).next() == Some(HEADER_MARKER)
}

/// Header columns of the log at `path`, or `None` when the file does not
/// exist or has no header line.
pub fn read_header(path: &Path) -> Option<Vec<String>> {
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .find(|line| is_header(line))
        .map(|line| line.split(DELIMITER).map(str::to_string).collect())
}

/// Parse the sample log at `path` and summarize it.
pub fn summarize_file(path: &Path) -> Result<ColumnSummary, SampleLogError> {
    let file = File::open(path).map_err(|source| SampleLogError::Missing {
        path: path.to_path_buf(),
        source,
    })?;
    summarize(BufReader::new(file))
}

/// Parse a sample log and compute column means and sample variances.
pub fn summarize<R: BufRead>(reader: R) -> Result<ColumnSummary, SampleLogError> {
    let mut header: Option<Vec<String>> = None;
    // Column-major: columns[c][r] is column c of data row r.
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_header(line) {
            let names: Vec<String> = line.split(DELIMITER).map(str::to_string).collect();
            match &header {
                // Repeated headers are skipped; data read so far is kept.
                Some(first) if *first == names => {}
                Some(_) => return Err(SampleLogError::HeaderMismatch { line: line_no }),
                None => {
                    columns = vec![Vec::new(); names.len().saturating_sub(1)];
                    header = Some(names);
                }
            }
            continue;
        }
        let Some(names) = header.as_ref() else {
            return Err(SampleLogError::NoHeader);
        };

        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() != names.len() {
            return Err(SampleLogError::Ragged {
                line: line_no,
                expected: names.len(),
                found: fields.len(),
            });
        }
        for (column, raw) in columns.iter_mut().zip(&fields[1..]) {
            let value: f64 = raw.trim().parse().map_err(|_| SampleLogError::NotANumber {
                line: line_no,
                value: raw.to_string(),
            })?;
            column.push(value);
        }
    }

    let header = header.ok_or(SampleLogError::NoHeader)?;
    let samples = columns.first().map_or(0, Vec::len);
    if samples < 2 {
        return Err(SampleLogError::TooFewSamples(samples));
    }

    let means: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
    let variances = columns
        .iter()
        .zip(&means)
        .map(|(c, &m)| sample_variance(c, m))
        .collect();

    Ok(ColumnSummary {
        header,
        samples,
        means,
        variances,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased (n - 1) variance around a precomputed mean.
fn sample_variance(values: &[f64], mean: f64) -> f64 {
    let sum_sq: f64 = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum();
    sum_sq / (values.len() - 1) as f64
}
