use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use fastwork_sync::board::GithubProjects;
use fastwork_sync::config;

/// Delete every item on the configured project board. Administrative; not
/// part of the steady-state pipeline.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    if !cfg.github.enabled {
        bail!("github is disabled in {}", args.config.display());
    }

    let board = GithubProjects::from_config(&cfg.github)?;
    let report = board.clear().await?;
    println!("Cleared {}/{} items from the project board", report.deleted, report.found);
    Ok(())
}
