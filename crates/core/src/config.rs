use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_override<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })
}

// ── Top-level config ──────────────────────────────────────────

/// Settings for one sampling run, typically parsed from TOML and then
/// overridden by environment variables and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Shared template job configuration.
    #[serde(default = "default_template")]
    pub template: PathBuf,
    /// Directory receiving per-worker scratch files and output tables.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Keep model-evaluation terms in per-worker sample logs.
    #[serde(default)]
    pub include_models: bool,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub outputs: OutputConfig,
}

fn default_threads() -> usize { 2 }
fn default_template() -> PathBuf { PathBuf::from("torchtree.json") }
fn default_work_dir() -> PathBuf { PathBuf::from(".") }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            template: default_template(),
            work_dir: default_work_dir(),
            include_models: false,
            engine: EngineConfig::default(),
            outputs: OutputConfig::default(),
        }
    }
}

impl SamplingConfig {
    /// Load config from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        debug!(config_path = %path.display(), "Loading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `SAMPLING_*` overrides from the process environment
    /// (call `load_dotenv()` first).
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env_opt)
    }

    /// Apply overrides from an arbitrary key lookup. Unset keys leave the
    /// current value untouched.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SAMPLING_THREADS") {
            self.threads = parse_override("SAMPLING_THREADS", v)?;
        }
        if let Some(v) = lookup("SAMPLING_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SAMPLING_ENGINE") {
            self.engine.program = v;
        }
        if let Some(v) = lookup("SAMPLING_TIMEOUT_SECS") {
            self.engine.timeout_secs = Some(parse_override("SAMPLING_TIMEOUT_SECS", v)?);
        }
        Ok(())
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.threads
        }
    }

    pub fn means_path(&self) -> PathBuf {
        self.work_dir.join(&self.outputs.means)
    }

    pub fn variances_path(&self) -> PathBuf {
        self.work_dir.join(&self.outputs.variances)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  threads:     {} (resolved {})", self.threads, self.resolved_threads());
        tracing::info!("  template:    {}", self.template.display());
        tracing::info!("  work_dir:    {}", self.work_dir.display());
        tracing::info!("  models:      {}", if self.include_models { "kept" } else { "stripped" });
        tracing::info!(
            "  engine:      {} {:?}, timeout={}",
            self.engine.program,
            self.engine.args,
            self.engine
                .timeout_secs
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "none".to_string())
        );
        tracing::info!("  outputs:     {}, {}", self.outputs.means, self.outputs.variances);
    }
}

// ── Engine ────────────────────────────────────────────────────

/// External computation invoked once per work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before `-c <checkpoint> <config>`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the engine after this many seconds. None = wait forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_program() -> String { "torchtree".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ── Outputs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_means")]
    pub means: String,
    #[serde(default = "default_variances")]
    pub variances: String,
}

fn default_means() -> String { "means.csv".to_string() }
fn default_variances() -> String { "variances.csv".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            means: default_means(),
            variances: default_variances(),
        }
    }
}
