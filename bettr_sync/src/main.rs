//! bettr sync - NBA statistics into SQLite
//!
//! Loads team game logs (from the stats API or a CSV export) and appends the
//! rows that aren't stored yet. Runs once or on a fixed interval.

use bettr_sync::source::{nba_stats, CsvSource};
use bettr_sync::{
    models, RecordBatch, RetryPolicy, RowFailureReason, SqliteStore, SyncError, SyncOptions, Syncer,
    ValidationMode,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Sync NBA statistics into a local SQLite database
#[derive(Parser, Debug)]
#[command(name = "bettr_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Table to sync
    #[arg(short, long, default_value = "team_game_log", value_parser = ["team", "team_game_log"])]
    model: String,

    /// Load rows from a CSV file instead of the stats API
    #[arg(long)]
    csv: Option<PathBuf>,

    /// First season to pull (season starting in this year)
    #[arg(long, default_value_t = nba_stats::DEFAULT_START_YEAR)]
    start_year: i32,

    /// Last season to pull (default: current year)
    #[arg(long)]
    end_year: Option<i32>,

    /// Season type passed to the stats API
    #[arg(long, default_value = "Regular Season")]
    season_type: String,

    /// Drop fields that aren't columns of the table instead of failing
    /// (always on for the stats API, whose result sets carry rank columns)
    #[arg(long, default_value_t = false)]
    lenient: bool,

    /// Leave invalid rows out instead of failing the batch
    #[arg(long, default_value_t = false)]
    skip_invalid: bool,

    /// How long a write waits on a locked database, in milliseconds
    #[arg(long, default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Pause before retrying a transient write failure, in milliseconds
    #[arg(long, default_value_t = 250)]
    retry_backoff_ms: u64,

    /// Run once and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Interval between syncs in hours when running continuously
    #[arg(long, default_value_t = 24)]
    interval_hours: u64,
}

/// Returns the default database path: ~/.local/share/bettr/bettr.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bettr")
        .join("bettr.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting bettr_sync...");
    log::info!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match SqliteStore::open(&db_path, Duration::from_millis(args.busy_timeout_ms)) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let options = SyncOptions {
        mode: if args.lenient || args.csv.is_none() {
            ValidationMode::Lenient
        } else {
            ValidationMode::Strict
        },
        skip_invalid: args.skip_invalid,
        retry: RetryPolicy {
            backoff: Duration::from_millis(args.retry_backoff_ms),
            ..RetryPolicy::default()
        },
    };
    let syncer = Arc::new(Syncer::new(store, options));

    // value_parser restricts --model to known tables
    let Some(model) = models::by_table(&args.model) else {
        log::error!("Unknown model: {}", args.model);
        std::process::exit(1);
    };
    if let Err(e) = syncer.registry().register(&model) {
        log::error!("Failed to register {}: {}", args.model, e);
        std::process::exit(1);
    }

    if args.once {
        if !run_sync(&syncer, &args).await {
            std::process::exit(1);
        }
    } else {
        log::info!(
            "Running in daemon mode, syncing every {} hour(s)",
            args.interval_hours
        );
        run_daemon(&syncer, &args).await;
    }
}

/// Sync on a fixed interval, starting immediately
async fn run_daemon(syncer: &Arc<Syncer<SqliteStore>>, args: &Args) {
    let mut ticker = interval(Duration::from_secs(args.interval_hours.max(1) * 3600));

    loop {
        // The first tick completes immediately
        ticker.tick().await;
        log::info!("Scheduled sync triggered");
        run_sync(syncer, args).await;
    }
}

/// Fetch one batch and sync it. Returns whether the sync succeeded.
async fn run_sync(syncer: &Arc<Syncer<SqliteStore>>, args: &Args) -> bool {
    let batch = match fetch_batch(syncer, args).await {
        Ok(batch) => models::shape(&args.model, batch),
        Err(e) => {
            log::error!("Failed to fetch {}: {}", args.model, e);
            return false;
        }
    };

    // SQLite writes and the retry backoff block
    let outcome = {
        let syncer = Arc::clone(syncer);
        let table = args.model.clone();
        tokio::task::spawn_blocking(move || syncer.sync_table(&table, batch)).await
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Sync task for {} failed: {}", args.model, e);
            return false;
        }
    };

    match outcome {
        Ok(result) => {
            log::info!(
                "Sync of {} completed: {} inserted, {} skipped",
                args.model,
                result.inserted_count,
                result.skipped_count
            );
            for error in &result.errors {
                log::warn!("Row {} left out: {}", error.row_index, error.reason);
            }
            true
        }
        Err(e) => {
            log::error!("Sync of {} failed: {}", args.model, e);
            if let SyncError::Validation(v) = &e {
                if v.failures.iter().any(|f| f.reason == RowFailureReason::UnknownField) {
                    log::info!("Run with --lenient to drop fields that aren't columns of {}", args.model);
                }
            }
            false
        }
    }
}

async fn fetch_batch(
    syncer: &Syncer<SqliteStore>,
    args: &Args,
) -> Result<RecordBatch, Box<dyn std::error::Error>> {
    if let Some(path) = &args.csv {
        let schema = syncer.registry().get(&args.model)?;
        return Ok(CsvSource::new(path).read(&schema)?);
    }

    if args.model != "team_game_log" {
        return Err(format!("the stats API source only provides team_game_log, use --csv for {}", args.model).into());
    }

    let end_year = args.end_year.unwrap_or_else(nba_stats::current_year);
    Ok(nba_stats::fetch_team_game_logs_range(args.start_year, end_year, &args.season_type).await?)
}
