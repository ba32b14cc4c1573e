use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use fastwork_sync::board::{BoardService, GithubProjects};
use fastwork_sync::config;
use fastwork_sync::db;
use fastwork_sync::pipeline::Pipeline;
use fastwork_sync::source::FastworkClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single ingestion cycle
    Run {
        /// Cap on jobs processed this cycle (default: filter.max_jobs_per_run)
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict the cycle to these category keys (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Run cycles on the configured interval until interrupted
    Watch,
    /// Verify the sync-target connection and print the authenticated login
    Check,
    /// Fetch one listing by id and print its raw JSON
    Show {
        #[arg(long)]
        id: String,
    },
    /// Print an example configuration file
    ConfigExample,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if matches!(args.command, Command::ConfigExample) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url.clone());

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let source = FastworkClient::from_config(&cfg.source)?;
    let board: Option<GithubProjects> = if cfg.github.enabled && cfg.github.sync_on_fetch {
        Some(GithubProjects::from_config(&cfg.github)?)
    } else {
        None
    };
    let board_ref = board.as_ref().map(|b| b as &dyn BoardService);

    let pipeline = Pipeline::new(cfg.clone());

    match args.command {
        Command::Run { limit, categories } => {
            let limit = limit.unwrap_or(cfg.filter.max_jobs_per_run);
            let keys = if categories.is_empty() {
                None
            } else {
                Some(categories.as_slice())
            };
            pipeline
                .run_cycle(&pool, &source, board_ref, limit, keys)
                .await?;
        }
        Command::Watch => {
            let interval = Duration::from_secs(cfg.app.cycle_interval_secs);
            info!(interval_secs = cfg.app.cycle_interval_secs, "starting watch loop");
            loop {
                if let Err(err) = pipeline
                    .run_cycle(&pool, &source, board_ref, cfg.filter.max_jobs_per_run, None)
                    .await
                {
                    error!(?err, "cycle failed; next scheduled cycle will retry");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("interrupted, shutting down");
                        break;
                    }
                }
            }
        }
        Command::Check => {
            if !cfg.github.enabled {
                anyhow::bail!("github is disabled in {}", args.config.display());
            }
            let board = GithubProjects::from_config(&cfg.github)?;
            let login = board.viewer().await?;
            println!("Authenticated as {}", login);
        }
        Command::Show { id } => {
            let outcome = source.fetch_details(&id).await;
            match outcome.job {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
                None => println!(
                    "Job {} not found{}",
                    id,
                    outcome
                        .error
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                ),
            }
        }
        Command::ConfigExample => unreachable!(),
    }

    Ok(())
}
