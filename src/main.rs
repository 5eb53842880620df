//! metric-sink Binary Entry Point
//!
//! Reads newline-delimited JSON samples from a file or stdin and writes them
//! through the reporter configured in the YAML config file. Core functionality
//! is provided by the `metric_sink` library crate.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use clap::Parser;
use metric_sink::{MetricSample, ReporterBuilder, config::AppConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// metric-sink - Self-healing relational sink for metric samples
#[derive(Parser, Debug)]
#[command(name = "metric-sink", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "METRIC_SINK_CONFIG"
    )]
    config: String,

    /// NDJSON sample file (default: stdin)
    #[arg(short, long)]
    input: Option<String>,

    /// Database URL (overrides config file)
    #[arg(long, env = "METRIC_SINK_DB_URL")]
    db_url: Option<String>,

    /// Record every metric key (overrides config file)
    #[arg(long)]
    record_all: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metric_sink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if cli.record_all {
        config.filter.record_all = true;
    }

    tracing::info!(
        "Database: {} ({}), {} mapped metric(s), record_all={}",
        config.database.url,
        config.database.driver,
        config.filter.tables.len(),
        config.filter.record_all,
    );

    let reporter =
        ReporterBuilder::from_config(&config.database, config.filter.to_allow_list())?.build()?;

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => {
            tracing::info!("Reading samples from: {}", path);
            Box::new(BufReader::new(File::open(path)?))
        }
        None => {
            tracing::info!("Reading samples from stdin");
            Box::new(BufReader::new(io::stdin().lock()))
        }
    };

    let mut malformed = 0_u64;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<MetricSample>(line) {
            Ok(sample) => {
                reporter.report_sample(&sample);
            }
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping malformed sample");
                malformed += 1;
            }
        }
    }

    let stats = reporter.stats();
    tracing::info!(
        inserted = stats.inserted,
        tables_created = stats.tables_created,
        columns_added = stats.columns_added,
        filtered = stats.filtered,
        rejected = stats.rejected,
        unavailable = stats.unavailable,
        failed = stats.failed,
        malformed,
        "Input exhausted"
    );

    reporter.close();
    tracing::info!("Shutdown complete");
    Ok(())
}
