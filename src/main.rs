// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use awattar_ingest::{
    AwattarSource, BatchDownloader, DailyStats, IngestConfig, IngestMode, IngestionPipeline, PriceStore,
    RunStatus, SystemClock, TimeWindow,
};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "awattar-ingest", about = "Day-ahead electricity price ingestion")]
struct Cli {
    /// SQLite file, overrides AWATTAR_DB_PATH
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one day of hourly prices into the store
    Fetch {
        #[arg(long, value_enum, default_value_t = Day::Tomorrow)]
        day: Day,
        /// Replace whatever is stored for that day
        #[arg(long)]
        replace: bool,
    },
    /// Download monthly CSV exports to disk
    Backfill {
        #[arg(long)]
        from: i32,
        #[arg(long)]
        to: Option<i32>,
        #[arg(long, default_value = "awattar_csv_files")]
        out: PathBuf,
    },
    /// Print the statistics of a stored day as JSON
    Stats {
        /// Market-local day, defaults to tomorrow
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete stored prices between two dates, inclusive
    Clear {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Day {
    Yesterday,
    Today,
    Tomorrow,
}

impl Day {
    fn offset(self) -> i64 {
        match self {
            Day::Yesterday => -1,
            Day::Today => 0,
            Day::Tomorrow => 1,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = IngestConfig::from_env().context("reading configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping at the next safe point");
                cancel.cancel();
            }
        });
    }

    let windows = TimeWindow::new(config.market_tz, Arc::new(SystemClock));

    match cli.command {
        Command::Fetch { day, replace } => {
            let store = Arc::new(PriceStore::open(&config.db_path).context("opening price store")?);
            let source = AwattarSource::new(&config)?;
            let pipeline = IngestionPipeline::new(source, Arc::clone(&store), windows, &config);

            let mode = if replace { IngestMode::Replace } else { IngestMode::Skip };
            let report = pipeline.ingest_day(day.offset(), mode, &cancel).await;
            println!("{}", serde_json::to_string(&report)?);

            drop(pipeline);
            if let Ok(store) = Arc::try_unwrap(store) {
                store.close()?;
            }
            if let RunStatus::Failed(reason) = report.status {
                anyhow::bail!("ingestion failed: {reason}");
            }
        }
        Command::Backfill { from, to, out } => {
            let source = AwattarSource::new(&config)?;
            let to = to.unwrap_or_else(|| windows.now_local().year());
            let report = BatchDownloader::new(&source, &windows)
                .download_range(from, to, &out, &cancel)
                .await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Stats { date } => {
            let store = PriceStore::open(&config.db_path).context("opening price store")?;
            let window = match date {
                Some(date) => windows.for_date(date)?,
                None => windows.day(1)?,
            };
            match DailyStats::for_window(&window, windows.tz(), &store.query_window(&window)?) {
                Some(stats) => println!("{}", serde_json::to_string(&stats)?),
                None => info!(date = %window.day, "no prices stored for this date"),
            }
            store.close()?;
        }
        Command::Clear { from, to } => {
            let store = PriceStore::open(&config.db_path).context("opening price store")?;
            let deleted = store.clear_range(from, to)?;
            info!(deleted, "rows removed");
            store.close()?;
        }
    }

    Ok(())
}
