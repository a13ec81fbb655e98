//! Envato author sales reports
//!
//! Fetches the author statement and earnings history, caches built reports in
//! SQLite and prints them as tables, JSON or CSV files.

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use author_reports::config::FileConfig;
use author_reports::constants;
use author_reports::export;
use author_reports::{EnvatoClient, MonthlyRequest, ReportBuilder, SqliteCache, WindowParams};

/// Load config file or exit with helpful message
fn load_config_file(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        anyhow::bail!(
            "Config file '{}' not found.\n\n\
            To get started:\n\
            1. Create {} with an [envato] section\n\
            2. Set token = \"<your personal token>\"\n\n\
            The token needs the 'View your account statement' and \
            'View your items sales history' permissions.",
            path.display(),
            constants::CONFIG_FILENAME
        );
    }

    FileConfig::load(path)
}

#[derive(Parser, Debug)]
#[command(name = "author-reports")]
#[command(about = "Sales and earnings reports for an Envato author account")]
struct Args {
    /// Path to config.toml
    #[arg(short, long, default_value = constants::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monthly sales and earnings summary for a year
    Yearly {
        /// Calendar year (default: current year)
        #[arg(long)]
        year: Option<i32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Daily and per-item report for a month or part of one
    Monthly {
        /// Calendar year (default: year of the previous month)
        #[arg(long)]
        year: Option<i32>,

        /// Month 1-12 (default: previous month)
        #[arg(long)]
        month: Option<u32>,

        /// First day of the range
        #[arg(long)]
        day: Option<u32>,

        /// Last day of the range
        #[arg(long)]
        to_day: Option<u32>,

        /// Only include sales of this item id
        #[arg(long)]
        item: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write sales.csv, daily.csv and items.csv here
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },

    /// Inspect or clean the report cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Show live and expired entry counts
    Stats,

    /// Delete expired entries
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_file(&args.config)?;
    config.logging.init();

    let cache = SqliteCache::open(&config.cache.path)
        .await
        .with_context(|| format!("Failed to open cache: {}", config.cache.path.display()))?;

    match args.command {
        Command::Cache { action } => handle_cache_command(action, &cache).await,
        Command::Yearly { year, json } => {
            let builder = report_builder(&config, cache)?;
            run_yearly(&builder, year, json).await
        }
        Command::Monthly {
            year,
            month,
            day,
            to_day,
            item,
            json,
            csv_dir,
        } => {
            let request = MonthlyRequest {
                window: WindowParams {
                    year,
                    month,
                    day,
                    to_day,
                },
                envato_item_id: item,
            };
            let builder = report_builder(&config, cache)?;
            run_monthly(&builder, &request, json, csv_dir.as_deref()).await
        }
    }
}

fn report_builder(
    config: &FileConfig,
    cache: SqliteCache,
) -> Result<ReportBuilder<EnvatoClient, SqliteCache>> {
    let envato = config.require_envato()?;
    info!(
        token = %envato.masked_token(),
        base_url = %envato.base_url,
        "using Envato API"
    );
    let client = EnvatoClient::new(envato)?;

    Ok(ReportBuilder::new(client, cache).with_max_pages(envato.max_pages))
}

async fn run_yearly(
    builder: &ReportBuilder<EnvatoClient, SqliteCache>,
    year: Option<i32>,
    json: bool,
) -> Result<()> {
    let year = year.unwrap_or_else(|| Local::now().year());
    let report = builder
        .yearly_report(Some(year))
        .await
        .context("Failed to build yearly report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Earnings for {}:\n", year);
        export::print_yearly(year, &report);
    }

    Ok(())
}

async fn run_monthly(
    builder: &ReportBuilder<EnvatoClient, SqliteCache>,
    request: &MonthlyRequest,
    json: bool,
    csv_dir: Option<&Path>,
) -> Result<()> {
    let envelope = builder
        .monthly_report(request)
        .await
        .context("Failed to build monthly report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        export::print_monthly(&envelope);
    }

    if let Some(dir) = csv_dir {
        for path in export::write_csv(dir, &envelope)? {
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Handle cache subcommands
async fn handle_cache_command(action: CacheCommand, cache: &SqliteCache) -> Result<()> {
    match action {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            println!("Report cache: {}", stats);
        }
        CacheCommand::Purge => {
            let removed = cache.purge_expired().await?;
            println!("Removed {} expired cache entries", removed);
        }
    }

    Ok(())
}
