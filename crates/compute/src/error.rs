//! Error taxonomy for a sampling run.
//!
//! Startup problems ([`InputError`]) and aggregation problems
//! ([`AggregationError`]) abort the run. Per-item problems ([`ItemError`])
//! only leave that item's row unpopulated.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Work-item identifier without a parseable `-<digits>.json` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot extract order key from '{identifier}': {reason}")]
pub struct ParseError {
    pub identifier: String,
    pub reason: String,
}

/// Template configuration lacking a required stage or shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("template has no '{0}' stage")]
    MissingStage(&'static str),

    #[error("malformed template: {0}")]
    Malformed(String),
}

/// Fatal at startup: aborts before any worker starts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error(transparent)]
    Identifier(#[from] ParseError),

    #[error(transparent)]
    Template(#[from] ConfigError),

    #[error("no sources given")]
    NoSources,

    #[error("order key {order_key} shared by '{first}' and '{second}'")]
    DuplicateOrderKey {
        order_key: u64,
        first: String,
        second: String,
    },

    #[error("cannot read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read template {path}: {message}")]
    TemplateFile { path: PathBuf, message: String },

    #[error("cannot prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scoped to one work item; never crashes other workers.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("sample log unusable: {0}")]
    SampleLog(#[from] SampleLogError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("worker panicked while processing the item")]
    Panicked,
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("member '{member}' not found in {archive}")]
    MemberNotFound { archive: PathBuf, member: String },

    #[error("cannot read checkpoint {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited with status {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("engine terminated by signal")]
    Killed,

    #[error("engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("runtime error: {0}")]
    Runtime(String),
}

#[derive(Debug, Error)]
pub enum SampleLogError {
    #[error("sample log {path} missing: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read sample log: {0}")]
    Read(#[from] std::io::Error),

    #[error("sample log has no header line")]
    NoHeader,

    #[error("line {line}: header differs from the first header")]
    HeaderMismatch { line: usize },

    #[error("line {line}: expected {expected} columns, found {found}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: '{value}' is not a number")]
    NotANumber { line: usize, value: String },

    #[error("need at least 2 samples, found {0}")]
    TooFewSamples(usize),
}

/// Fatal, reported at the end of the run.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no worker produced a sample log header")]
    NoHeader,

    #[error("row {index} has {found} statistics, header has {expected} data columns")]
    SchemaMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("cannot write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Work queue misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("index {0} is not in flight")]
    NotInFlight(usize),
}

/// Results table misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("row {0} is out of range")]
    OutOfRange(usize),

    #[error("row {0} already populated")]
    AlreadyPopulated(usize),
}

/// Top-level run failure.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}
