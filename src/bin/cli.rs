//! Toplist archive CLI
//!
//! Local execution entry point. For AWS Lambda, use `toplist-archive-lambda`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use toplist_archive::{
    error::{AppError, Result},
    models::{Config, CrawlTrigger, PeriodType},
    pipeline::{self, CrawlContext, RunOptions, RunOutcome},
    storage::{RelationalStore, SqliteStore},
};

/// Toplist archive - ranked gallery crawler
#[derive(Parser, Debug)]
#[command(
    name = "toplist-archive",
    version,
    about = "Archives ranked gallery toplists, gallery details and tag translations"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config (if missing) and create the database
    Init,

    /// Validate configuration and database partitions
    Validate,

    /// Run one job now
    Run {
        /// crawl-toplists, update-gallery or crawl-tags-translation
        trigger: CrawlTrigger,

        /// Re-apply the translation asset even if unchanged
        #[arg(long)]
        force: bool,
    },

    /// Queue a job for a later `drain`
    Enqueue {
        trigger: CrawlTrigger,

        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
    },

    /// Run every due queued job
    Drain {
        #[arg(long)]
        force: bool,
    },

    /// Print one day's toplist as JSON
    Show {
        /// List date, YYYY-MM-DD
        date: String,

        /// day, month, year or all
        period: PeriodType,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, default_level: &str) {
    let level = if verbose { "debug" } else { default_level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::load_or_default(&cli.config)
    };
    init_logging(cli.verbose, &config.logging.level);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Init => {
            if cli.config.exists() {
                log::info!("Config already exists at {}", cli.config.display());
            } else {
                if let Some(parent) = cli.config.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let text = toml::to_string_pretty(&Config::default())
                    .map_err(|e| AppError::config(format!("Serializing default config: {e}")))?;
                std::fs::write(&cli.config, text)?;
                log::info!("Wrote default config to {}", cli.config.display());
            }
            let store = SqliteStore::open(&config.storage.database_path, &config.storage)?;
            log::info!(
                "Database ready at {} ({} partitions)",
                config.storage.database_path,
                store.partition_tables()?.len()
            );
        }

        Command::Validate => {
            pipeline::validate_setup(&config)?;
            log::info!("All validations passed!");
        }

        Command::Run { trigger, force } => {
            let ctx = CrawlContext::open(config)?;
            let outcome = pipeline::run_trigger(
                &ctx,
                trigger,
                RunOptions {
                    force_translation: force,
                },
            )
            .await?;
            print_outcomes(std::slice::from_ref(&outcome))?;
        }

        Command::Enqueue {
            trigger,
            delay_secs,
        } => {
            let ctx = CrawlContext::open(config)?;
            pipeline::dispatch::schedule(&ctx, trigger, Duration::from_secs(delay_secs)).await?;
        }

        Command::Drain { force } => {
            let ctx = CrawlContext::open(config)?;
            let outcomes = pipeline::drain_queue(
                &ctx,
                RunOptions {
                    force_translation: force,
                },
            )
            .await?;
            print_outcomes(&outcomes)?;
        }

        Command::Show { date, period } => {
            let store = SqliteStore::open(&config.storage.database_path, &config.storage)?;
            let rows = store.query_toplist(&date, period).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn print_outcomes(outcomes: &[RunOutcome]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcomes)?);
    Ok(())
}
