use std::path::Path;
use std::sync::Arc;

use chkpt_core::SamplingConfig;
use serde_json::Value;
use tracing::{debug, info};

use crate::engine::{CommandEngine, Engine};
use crate::error::InputError;
use crate::materialize::DerivedConfig;
use crate::scheduler::worker::{Worker, WorkerFiles};

/// The sampling driver. Fans work items out to a bounded pool of
/// [`Worker`]s, each invoking the configured [`Engine`].
pub struct Sampler {
    pub(super) config: SamplingConfig,
    pub(super) engine: Arc<dyn Engine>,
}

impl Sampler {
    /// Create a sampler with an explicit engine.
    pub fn new(config: SamplingConfig, engine: Arc<dyn Engine>) -> Self {
        info!("Sampler using engine: {}", engine.name());
        Self { config, engine }
    }

    /// Create a sampler that runs the command-line engine from `config`.
    pub fn from_config(config: SamplingConfig) -> Self {
        let engine = Arc::new(CommandEngine::from_config(&config.engine));
        Self::new(config, engine)
    }

    /// Never more workers than items.
    pub fn worker_count(&self, items: usize) -> usize {
        self.config.resolved_threads().min(items)
    }

    /// Read and parse the template job configuration.
    pub fn load_template(path: &Path) -> Result<Value, InputError> {
        let fail = |message: String| InputError::TemplateFile {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| fail(e.to_string()))
    }

    /// Derive and write one configuration per worker.
    pub(super) fn prepare_workers(
        &self,
        template: &Value,
        count: usize,
    ) -> Result<Vec<Worker>, InputError> {
        let work_dir = &self.config.work_dir;
        std::fs::create_dir_all(work_dir).map_err(|source| InputError::Prepare {
            path: work_dir.clone(),
            source,
        })?;

        (0..count)
            .map(|id| {
                let files = WorkerFiles::new(work_dir, id);
                let derived = DerivedConfig::derive(
                    template,
                    id,
                    files.sample_log.clone(),
                    self.config.include_models,
                )?;
                derived
                    .write_to(&files.config)
                    .map_err(|source| InputError::Prepare {
                        path: files.config.clone(),
                        source,
                    })?;
                debug!(worker = id, config = %files.config.display(), "derived config written");
                Ok(Worker::new(files, derived))
            })
            .collect()
    }
}
