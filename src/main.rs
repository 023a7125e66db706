//! CLI entry point for the taxi trip ETL tool.
//!
//! Provides a one-shot `convert` batch job that ingests a Parquet trip
//! dataset into the trip store, plus query subcommands for daily trip
//! counts, the per-cell fare heatmap, and daily average speed.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use taxi_trip_etl::decode::ParquetSource;
use taxi_trip_etl::output::{print_json, print_pretty};
use taxi_trip_etl::pipeline::{self, CancelFlag, IngestSummary, PipelineConfig};
use taxi_trip_etl::queries::types::Page;
use taxi_trip_etl::queries::{heatmap, speed, totals};
use taxi_trip_etl::store::MemoryStore;

#[derive(Parser)]
#[command(name = "taxi_trip_etl")]
#[command(about = "Convert taxi trip datasets and run trip analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Parquet trip dataset into the trip store
    Convert {
        /// Path to the Parquet source file
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Worker pool size (0 = available CPU parallelism)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,

        /// Capacity of the bounded submit channel (minimum 1)
        #[arg(long, default_value_t = 20)]
        channel_capacity: usize,

        /// Records buffered per worker before a bulk write
        #[arg(long, default_value_t = 100)]
        flush_threshold: usize,
    },
    /// Daily trip counts over a date range
    TotalTrips {
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Range start, YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,

        /// Range end, YYYY-MM-DD (must not precede start)
        #[arg(long)]
        end: NaiveDate,
    },
    /// Per-cell average pickup fare for one day
    FareHeatmap {
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Day to aggregate, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        #[arg(short, long, default_value_t = 1)]
        page: u64,

        /// Source-scan page size, capped at 100
        #[arg(long, default_value_t = 10)]
        per_page: u64,
    },
    /// Average trip speed in km/h for one day
    AverageSpeed {
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Day to aggregate, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/taxi_trip_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("taxi_trip_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            source,
            workers,
            channel_capacity,
            flush_threshold,
        } => {
            let config = PipelineConfig {
                workers,
                channel_capacity,
                flush_threshold,
                ..PipelineConfig::default()
            };
            let store = Arc::new(MemoryStore::new());
            let summary = convert(store, &source, config).await?;
            println!(
                "Converted {} records in {:.2?} ({} dropped)",
                summary.committed, summary.elapsed, summary.dropped
            );
        }
        Commands::TotalTrips { source, start, end } => {
            let store = Arc::new(MemoryStore::new());
            convert(Arc::clone(&store), &source, PipelineConfig::default()).await?;

            let result = totals::total_trips(store.as_ref(), start, end).await?;
            print_json(&result)?;
        }
        Commands::FareHeatmap {
            source,
            date,
            page,
            per_page,
        } => {
            let store = Arc::new(MemoryStore::new());
            convert(Arc::clone(&store), &source, PipelineConfig::default()).await?;

            let result =
                heatmap::fare_heatmap(store.as_ref(), date, Page::new(page, per_page)).await?;
            print_json(&result)?;
        }
        Commands::AverageSpeed { source, date } => {
            let store = Arc::new(MemoryStore::new());
            convert(Arc::clone(&store), &source, PipelineConfig::default()).await?;

            let result = speed::average_speed(store.as_ref(), date).await?;
            print_json(&result)?;
        }
    }

    Ok(())
}

/// Runs the full ingestion pipeline for one source file. Ctrl+C cancels
/// the run at the next batch boundary and drains in-flight workers.
async fn convert(
    store: Arc<MemoryStore>,
    source_path: &str,
    config: PipelineConfig,
) -> Result<IngestSummary> {
    let source = ParquetSource::open(source_path)?;
    info!(source = %source_path, total_rows = source.total_rows(), "starting conversion");

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling ingest");
                cancel.cancel();
            }
        });
    }

    let summary = pipeline::ingest(store, source, config, cancel).await?;
    print_pretty(&summary);
    info!(
        committed = summary.committed,
        dropped = summary.dropped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "conversion complete"
    );
    Ok(summary)
}
