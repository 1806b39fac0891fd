//! Concurrent sampling scheduler.
//!
//! The [`Sampler`] enqueues every work item index on a shared [`WorkQueue`]
//! and starts a bounded pool of [`Worker`]s. Each worker drains the queue,
//! invoking the engine once per item and publishing into its row of the
//! [`ResultsTable`]. The run ends when the queue joins and every worker
//! has exited.

pub mod metrics;
pub mod queue;
pub mod results;
pub mod runner;
pub mod types;
pub mod worker;

pub use metrics::{ItemFailure, RunMetrics};
pub use queue::{Completion, WorkQueue};
pub use results::ResultsTable;
pub use runner::Sampler;
pub use types::{IncompleteRow, RunReport};
pub use worker::{Worker, WorkerFiles, WorkerState};
