//! Per-worker derivation of the shared template job configuration.
//!
//! The template is a JSON array of stages, each identified by its `id`.
//! A derived configuration drops the initializer stage (every task supplies
//! its own checkpoint instead), keeps only the numeric sample loggers of the
//! sampler stage and points them at the worker's private log file.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

pub const INITIALIZER_ID: &str = "advi";
pub const SAMPLER_ID: &str = "sampler";

const TREE_MARKER: &str = "tree";

/// Logger parameters that force expensive model evaluation.
pub const MODEL_TERMS: &[&str] = &[
    "joint.jacobian",
    "joint",
    "like",
    "prior",
    "variational",
    "coalescent",
    "skygrid",
    "skyglide",
    "gmrf",
];

fn stage_id(stage: &Value) -> Option<&str> {
    stage.get("id").and_then(Value::as_str)
}

/// Check that `template` has the shape the materializer relies on.
pub fn validate_template(template: &Value) -> Result<(), ConfigError> {
    let stages = template
        .as_array()
        .ok_or_else(|| ConfigError::Malformed("top level is not an array".to_string()))?;

    if !stages.iter().any(|s| stage_id(s) == Some(INITIALIZER_ID)) {
        return Err(ConfigError::MissingStage(INITIALIZER_ID));
    }
    let sampler = stages
        .iter()
        .find(|s| stage_id(s) == Some(SAMPLER_ID))
        .ok_or(ConfigError::MissingStage(SAMPLER_ID))?;
    if !sampler.get("loggers").is_some_and(Value::is_array) {
        return Err(ConfigError::Malformed(format!(
            "'{SAMPLER_ID}' stage has no loggers array"
        )));
    }
    Ok(())
}

/// Produce a derived configuration from `template`.
///
/// Pure: the template is only read, and the result shares nothing with it.
pub fn materialize(
    template: &Value,
    log_path: &Path,
    include_models: bool,
) -> Result<Value, ConfigError> {
    validate_template(template)?;

    let mut derived = template.clone();
    let Some(stages) = derived.as_array_mut() else {
        return Err(ConfigError::Malformed("top level is not an array".to_string()));
    };
    stages.retain(|s| stage_id(s) != Some(INITIALIZER_ID));

    let log_file = Value::String(log_path.to_string_lossy().into_owned());
    for stage in stages.iter_mut().filter(|s| stage_id(s) == Some(SAMPLER_ID)) {
        let Some(loggers) = stage.get_mut("loggers").and_then(Value::as_array_mut) else {
            continue;
        };
        loggers.retain(|l| !stage_id(l).is_some_and(|id| id.contains(TREE_MARKER)));

        for logger in loggers.iter_mut() {
            let Some(fields) = logger.as_object_mut() else {
                return Err(ConfigError::Malformed("logger entry is not an object".to_string()));
            };
            fields.insert("file_name".to_string(), log_file.clone());

            if !include_models {
                if let Some(params) = fields.get_mut("parameters").and_then(Value::as_array_mut) {
                    params.retain(|p| !p.as_str().is_some_and(|name| MODEL_TERMS.contains(&name)));
                }
            }
        }
    }

    Ok(derived)
}

/// Logger parameter names of a derived configuration, in logger order.
pub fn logger_spec(derived: &Value) -> Vec<String> {
    derived
        .as_array()
        .into_iter()
        .flatten()
        .filter(|s| stage_id(s) == Some(SAMPLER_ID))
        .filter_map(|s| s.get("loggers").and_then(Value::as_array))
        .flatten()
        .filter_map(|l| l.get("parameters").and_then(Value::as_array))
        .flatten()
        .filter_map(|p| p.as_str().map(str::to_string))
        .collect()
}

/// A worker's private job configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedConfig {
    pub owner_worker_id: usize,
    pub sampling_log_path: PathBuf,
    /// Template without its initializer stage, loggers rewritten.
    pub document: Value,
    pub logger_spec: Vec<String>,
}

impl DerivedConfig {
    pub fn derive(
        template: &Value,
        owner_worker_id: usize,
        sampling_log_path: PathBuf,
        include_models: bool,
    ) -> Result<Self, ConfigError> {
        let document = materialize(template, &sampling_log_path, include_models)?;
        let logger_spec = logger_spec(&document);
        Ok(Self {
            owner_worker_id,
            sampling_log_path,
            document,
            logger_spec,
        })
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.document)?;
        std::fs::write(path, text)
    }
}
