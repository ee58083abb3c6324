//! Ensemble inference - Main Entry Point
//!
//! Runs every configured checkpoint over the evaluation fold and writes the
//! averaged, greedily decoded predictions.

use anyhow::Result;
use clap::Parser;
use mer_ensemble::config::LoggingConfig;
use mer_ensemble::{pipeline, AppConfig, Cli};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli)?;

    init_tracing(&config.logging)?;

    info!("Starting ensemble inference");
    info!(
        models = ?config.models.paths,
        file_path = %config.data.file_path.display(),
        fold = config.data.fold,
        output_dir = %config.output.dir.display(),
        "Configuration loaded successfully"
    );

    let summary = pipeline::run(&config)?;

    info!(
        output = %summary.output_path.display(),
        predictions = summary.predictions,
        batches = summary.batches,
        "Inference finished"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mer_ensemble={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
