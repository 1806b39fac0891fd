mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use chkpt_compute::{JobSource, Sampler};
use chkpt_core::config::{load_dotenv, SamplingConfig};

use crate::cli::CliArgs;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = SamplingConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    config
        .apply_env()
        .context("invalid environment override")?;
    args.apply(&mut config);
    config.log_summary();

    let source = JobSource::from_paths(&args.src).context("invalid sources")?;
    let report = Sampler::from_config(config)
        .run(&source)
        .context("sampling run failed")?;

    info!(
        items = report.items,
        workers = report.workers,
        rows = report.aggregate.rows_written,
        means = %report.aggregate.means_path.display(),
        variances = %report.aggregate.variances_path.display(),
        "Sampling complete"
    );

    if !report.is_complete() {
        for line in report.incomplete_summary() {
            error!("{line}");
        }
        bail!(
            "{} of {} rows incomplete",
            report.incomplete.len(),
            report.items
        );
    }
    Ok(())
}
