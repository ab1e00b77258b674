use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use tickerpulse::config::Config;
use tickerpulse::enrich::{CashtagExtractor, LexiconSentiment, StaticClassifier};
use tickerpulse::feed::FeedFetcher;
use tickerpulse::ingest::{parse_result_cap, Collaborators, DateRange, Ingestor};
use tickerpulse::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "tickerpulse",
    about = "Ingest finance posts from subreddit feeds into SQLite"
)]
struct Args {
    /// Config file (missing file means defaults)
    #[arg(long, global = true, value_name = "FILE", default_value = "tickerpulse.toml")]
    config: PathBuf,

    /// Database path, overrides `database_path` from the config file
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the database schema to the current version
    Migrate,

    /// Fetch, filter, enrich and store one batch, then print it as JSON
    Ingest {
        /// Search query (defaults to `feeds.default_query`)
        #[arg(long)]
        query: Option<String>,

        /// Result cap, clamped to `feeds.max_results`
        #[arg(long, value_name = "N", allow_hyphen_values = true)]
        max_results: Option<String>,

        /// Earliest creation time kept (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_start)]
        start: Option<DateTime<Utc>>,

        /// Latest creation time kept (RFC 3339 or YYYY-MM-DD, whole day)
        #[arg(long, value_parser = parse_end)]
        end: Option<DateTime<Utc>>,
    },
}

fn parse_instant(raw: &str, day_time: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(day_time).and_utc())
        .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got {:?}", raw))
}

fn parse_start(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_instant(raw, NaiveTime::MIN)
}

fn parse_end(raw: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| "invalid end-of-day time".to_string())?;
    parse_instant(raw, end_of_day)
}

async fn open_database(path: &str) -> Result<Database> {
    match Database::open(path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database at {} is locked by another process.", path);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = open_database(&config.database_path).await?;

    match args.command {
        Command::Migrate => {
            let version = db.schema_version().await?;
            println!("Schema version: {}", version);
        }
        Command::Ingest {
            query,
            max_results,
            start,
            end,
        } => {
            let cap = match max_results.as_deref() {
                Some(raw) => parse_result_cap(raw)?,
                None => i64::try_from(config.feeds.max_results).unwrap_or(i64::MAX),
            };
            let range = match (start, end) {
                (None, None) => None,
                (start, end) => Some(DateRange::new(
                    start.unwrap_or(DateTime::<Utc>::MIN_UTC),
                    end.unwrap_or(DateTime::<Utc>::MAX_UTC),
                )?),
            };

            let classifier = StaticClassifier::from_table(&config.tickers);
            let services = Collaborators {
                sentiment: Arc::new(LexiconSentiment::new()),
                tickers: Arc::new(CashtagExtractor::with_known_symbols(classifier.symbols())),
                classifier: Arc::new(classifier),
                store: Arc::new(db.clone()),
            };
            let fetcher = FeedFetcher::new(&config.feeds).context("Failed to build HTTP client")?;
            let ingestor = Ingestor::new(&config, fetcher, services)?;

            let report = ingestor.ingest(query.as_deref(), cap, range).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    db.close().await;
    Ok(())
}
