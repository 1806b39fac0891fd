use std::path::PathBuf;

use chkpt_core::SamplingConfig;
use clap::Parser;

/// Sample from the variational distribution of every checkpoint and
/// calculate means and variances.
///
/// Sources are either one `.tar.gz` archive of checkpoints or any number
/// of loose checkpoint files named `<prefix>-<n>.json`.
#[derive(Parser, Debug)]
#[command(name = "sampling", about = "Calculate per-checkpoint means and variances")]
pub struct CliArgs {
    /// Checkpoint files, or a single .tar.gz archive
    #[arg(required = true, value_name = "SRC")]
    pub src: Vec<PathBuf>,

    /// Number of worker threads (0 = available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Template job configuration
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory for per-worker files and output tables
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep model-evaluation terms in the per-worker sample logs
    #[arg(long)]
    pub include_models: bool,

    /// Engine program invoked once per checkpoint
    #[arg(long)]
    pub engine: Option<String>,

    /// Kill an engine run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Path to a TOML config file
    #[arg(long, env = "SAMPLING_CONFIG")]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Flags given on the command line win over every other source.
    pub fn apply(&self, config: &mut SamplingConfig) {
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(input) = &self.input {
            config.template = input.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        if self.include_models {
            config.include_models = true;
        }
        if let Some(engine) = &self.engine {
            config.engine.program = engine.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.engine.timeout_secs = Some(secs);
        }
    }
}
