//! A sampling worker: drains the work queue one item at a time.
//!
//! Per item the worker moves through
//! `Dequeuing -> Resolving -> Invoking -> ParsingResult -> Publishing` and
//! back to `Dequeuing`, ending in `Idle` once the queue is drained. A failure
//! in any state abandons only the current item; its row stays empty and the
//! index is still marked done.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use chkpt_core::{SampleStatistics, WorkItem};
use tracing::{debug, info, info_span, warn};

use crate::archive;
use crate::engine::Engine;
use crate::error::{ItemError, ResolutionError, SampleLogError};
use crate::materialize::DerivedConfig;
use crate::scheduler::metrics::{ItemFailure, RunMetrics};
use crate::scheduler::queue::WorkQueue;
use crate::scheduler::results::ResultsTable;
use crate::source::JobSource;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Dequeuing,
    Resolving,
    Invoking,
    ParsingResult,
    Publishing,
}

/// Per-worker file locations inside the work directory. Unique per worker
/// id so concurrent workers never write the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFiles {
    pub config: PathBuf,
    pub sample_log: PathBuf,
    pub scratch_checkpoint: PathBuf,
}

impl WorkerFiles {
    pub fn new(work_dir: &Path, worker_id: usize) -> Self {
        Self {
            config: work_dir.join(format!("temp-torchtree-{worker_id}.json")),
            sample_log: work_dir.join(format!("temp-samples-{worker_id}.csv")),
            scratch_checkpoint: work_dir.join(format!("temp-checkpoint-{worker_id}.json")),
        }
    }
}

/// State every worker of a run reads or writes.
pub struct RunContext<'a> {
    pub items: &'a [WorkItem],
    pub source: &'a JobSource,
    pub queue: &'a WorkQueue,
    pub results: &'a ResultsTable,
    pub engine: &'a dyn Engine,
    pub metrics: &'a RwLock<RunMetrics>,
}

pub struct Worker {
    id: usize,
    files: WorkerFiles,
    config: DerivedConfig,
    state: WorkerState,
}

impl Worker {
    /// `config` must already be written to `files.config`.
    pub fn new(files: WorkerFiles, config: DerivedConfig) -> Self {
        Self {
            id: config.owner_worker_id,
            files,
            config,
            state: WorkerState::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn enter(&mut self, next: WorkerState) {
        debug!(from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    /// Process items until the queue is drained.
    pub fn run(mut self, ctx: &RunContext<'_>) {
        let _span = info_span!("worker", id = self.id).entered();
        info!(loggers = self.config.logger_spec.len(), "worker started");

        loop {
            self.enter(WorkerState::Dequeuing);
            let Some(completion) = ctx.queue.dequeue_guarded() else {
                break;
            };
            let index = completion.index();
            let Some(item) = ctx.items.get(index) else {
                warn!(index, "queue delivered an index without a work item");
                continue;
            };

            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.process(item, ctx.source, ctx.engine).and_then(|(stats, header)| {
                    self.enter(WorkerState::Publishing);
                    if !ctx.results.record_header(header) {
                        warn!(index, "sample log header differs from the recorded one");
                    }
                    ctx.results.publish(stats).map_err(ItemError::from)
                })
            }))
            .unwrap_or(Err(ItemError::Panicked));

            match outcome {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    debug!(index, order_key = item.order_key, ?elapsed, "item published");
                    ctx.metrics
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .record_success(self.id, elapsed);
                }
                Err(e) => {
                    warn!(index, order_key = item.order_key, error = %e, "item failed");
                    ctx.metrics
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .record_failure(ItemFailure {
                            index,
                            order_key: item.order_key,
                            worker: self.id,
                            error: e.to_string(),
                        });
                }
            }
            drop(completion);
        }

        self.enter(WorkerState::Idle);
        info!("worker drained");
    }

    /// Resolve, invoke and parse one item. Returns the statistics together
    /// with the header of the sample log they came from.
    pub fn process(
        &mut self,
        item: &WorkItem,
        source: &JobSource,
        engine: &dyn Engine,
    ) -> Result<(SampleStatistics, Vec<String>), ItemError> {
        self.enter(WorkerState::Resolving);
        let checkpoint = self.resolve(item, source)?;

        self.enter(WorkerState::Invoking);
        let invoked = self
            .clear_sample_log()
            .map_err(ItemError::from)
            .and_then(|()| {
                engine
                    .invoke(&checkpoint, &self.files.config)
                    .map_err(ItemError::from)
            });
        if source.archive_path().is_some() {
            let _ = std::fs::remove_file(&self.files.scratch_checkpoint);
        }
        invoked?;

        self.enter(WorkerState::ParsingResult);
        let summary = stats::summarize_file(&self.config.sampling_log_path)?;
        let stats = SampleStatistics {
            work_item_index: item.index,
            order_key: item.order_key,
            means: summary.means,
            variances: summary.variances,
        };
        Ok((stats, summary.header))
    }

    fn resolve(&self, item: &WorkItem, source: &JobSource) -> Result<PathBuf, ResolutionError> {
        match source {
            JobSource::Archive(archive_path) => {
                let dest = &self.files.scratch_checkpoint;
                archive::extract_member(archive_path, &item.source_identifier, dest)?;
                Ok(dest.clone())
            }
            JobSource::Files(_) => {
                let path = PathBuf::from(&item.source_identifier);
                std::fs::metadata(&path).map_err(|source| ResolutionError::Unreadable {
                    path: path.clone(),
                    source,
                })?;
                Ok(path)
            }
        }
    }

    /// A leftover log from the previous item must never be parsed as this
    /// item's output.
    fn clear_sample_log(&self) -> Result<(), SampleLogError> {
        match std::fs::remove_file(&self.config.sampling_log_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SampleLogError::Read(e)),
        }
    }
}
