use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chkpt_core::WorkItem;
use serde_json::Value;
use tracing::{info, warn};

use crate::aggregate;
use crate::error::{InputError, SamplingError};
use crate::materialize;
use crate::scheduler::metrics::RunMetrics;
use crate::scheduler::queue::WorkQueue;
use crate::scheduler::results::ResultsTable;
use crate::scheduler::types::{IncompleteRow, RunReport};
use crate::scheduler::worker::{RunContext, WorkerFiles};
use crate::source::JobSource;

use super::Sampler;

impl Sampler {
    /// Run against the template named in the config.
    pub fn run(&self, source: &JobSource) -> Result<RunReport, SamplingError> {
        let template = Self::load_template(&self.config.template)?;
        self.run_with_template(source, &template)
    }

    /// Process every work item of `source` and write the output tables.
    ///
    /// Blocks until the queue is drained and every worker has exited.
    /// Per-item failures are reported in [`RunReport::incomplete`]; only
    /// startup and aggregation problems are returned as errors.
    pub fn run_with_template(
        &self,
        source: &JobSource,
        template: &Value,
    ) -> Result<RunReport, SamplingError> {
        materialize::validate_template(template).map_err(InputError::from)?;
        let items = source.work_items()?;
        let count = self.worker_count(items.len());
        let workers = self.prepare_workers(template, count)?;
        let logs = sample_logs(&self.config.work_dir, count);

        info!(
            "Sampler starting with {} workers, {} work items",
            count,
            items.len()
        );

        let queue = WorkQueue::with_indices(items.len());
        let results = ResultsTable::new(items.len());
        let metrics = RwLock::new(RunMetrics::default());

        if count > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(count)
                .thread_name(|i| format!("sampler-{i}"))
                .build()
                .map_err(|e| SamplingError::Pool(e.to_string()))?;

            let ctx = RunContext {
                items: &items,
                source,
                queue: &queue,
                results: &results,
                engine: self.engine.as_ref(),
                metrics: &metrics,
            };

            pool.in_place_scope(|scope| {
                for worker in workers {
                    let ctx = &ctx;
                    scope.spawn(move |_| worker.run(ctx));
                }
                queue.join();
            });
        }

        let metrics = metrics.into_inner().unwrap_or_else(PoisonError::into_inner);
        let aggregate = aggregate::aggregate(
            logs.iter().map(PathBuf::as_path),
            &results,
            &self.config.means_path(),
            &self.config.variances_path(),
        )?;
        let incomplete = incomplete_rows(&items, &results, &metrics);

        info!(
            completed = metrics.items_completed(),
            failed = metrics.items_failed(),
            avg_item = ?metrics.avg_item_duration,
            "Sampler stopped"
        );
        if !incomplete.is_empty() {
            warn!(
                incomplete = incomplete.len(),
                total = items.len(),
                "run finished with incomplete rows"
            );
        }

        Ok(RunReport {
            items: items.len(),
            workers: count,
            metrics,
            aggregate,
            incomplete,
        })
    }
}

fn incomplete_rows(items: &[WorkItem], results: &ResultsTable, metrics: &RunMetrics) -> Vec<IncompleteRow> {
    results
        .missing()
        .into_iter()
        .filter_map(|index| items.get(index))
        .map(|item| IncompleteRow {
            index: item.index,
            order_key: item.order_key,
            source_identifier: item.source_identifier.clone(),
            error: metrics
                .failures
                .iter()
                .find(|f| f.index == item.index)
                .map(|f| f.error.clone()),
        })
        .collect()
}

fn sample_logs(work_dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|id| WorkerFiles::new(work_dir, id).sample_log)
        .collect()
}
