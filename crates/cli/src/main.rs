//! Marine risk command line interface.
//!
//! Runs the fusion pipeline over a directory of raw batches and queries the
//! resulting risk surface.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use marine_risk_pipeline::{CancellationToken, Pipeline, RunConfig, RunInputs, RunStatus};
use marine_risk_scoring::ScorerRegistry;
use marine_risk_storage::{RiskStore, SledRiskStore};
use marine_risk_types::{BoundingBox, DateRange, RiskQuery, ScoringVersion};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "marine-risk")]
#[command(about = "Spatial-temporal marine risk fusion engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize, validate, extract and score one batch of inputs
    Run {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory holding ais/, sightings/, bathymetry/ and mpa/ batches
        #[arg(long)]
        inputs: PathBuf,
        /// Risk store directory
        #[arg(long)]
        store: PathBuf,
    },
    /// Query stored risk records as JSON lines
    Query {
        #[arg(long)]
        store: PathBuf,
        /// min_lon,min_lat,max_lon,max_lat
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BoundingBox,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Scoring version; defaults to the most recently written one
        #[arg(long)]
        version: Option<String>,
        /// Return only the newest revision per cell-time
        #[arg(long)]
        latest_revision: bool,
    },
    /// List scoring versions present in a store
    Versions {
        #[arg(long)]
        store: PathBuf,
    },
    /// Print the default configuration or check a configuration file
    Config {
        /// Print the default configuration as TOML
        #[arg(long, conflicts_with = "check")]
        print_default: bool,
        /// Load and validate a configuration file, listing its scorers
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

fn parse_bbox(raw: &str) -> std::result::Result<BoundingBox, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts[..] else {
        return Err(format!("expected 4 comma-separated values, got {}", parts.len()));
    };
    BoundingBox::new(min_lon, min_lat, max_lon, max_lat).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run {
            config,
            inputs,
            store,
        } => run(config, inputs, store).await,
        Commands::Query {
            store,
            bbox,
            from,
            to,
            version,
            latest_revision,
        } => {
            let dates = DateRange::new(from, to)?;
            let mut query = RiskQuery::new(bbox, dates);
            if let Some(version) = version {
                query = query.with_version(ScoringVersion::new(version));
            }
            if latest_revision {
                query = query.latest_revision_only();
            }
            query_store(store, query)
        }
        Commands::Versions { store } => {
            let store = SledRiskStore::open(&store)
                .with_context(|| format!("opening store {}", store.display()))?;
            let latest = store.latest_version()?;
            for version in store.versions()? {
                let marker = if Some(&version) == latest.as_ref() { " (latest)" } else { "" };
                println!("{version}{marker}");
            }
            Ok(())
        }
        Commands::Config {
            print_default,
            check,
        } => handle_config(print_default, check),
    }
}

async fn run(config: Option<PathBuf>, inputs: PathBuf, store_path: PathBuf) -> Result<()> {
    let config = RunConfig::load(config.as_deref())?;
    let inputs = RunInputs::from_dir(&inputs)?;
    let store = Arc::new(
        SledRiskStore::open(&store_path)
            .with_context(|| format!("opening store {}", store_path.display()))?,
    );
    let pipeline = Pipeline::new(config, store.clone())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight cells");
            on_signal.cancel();
        }
    });

    let summary = tokio::task::spawn_blocking(move || pipeline.run(&inputs, &cancel))
        .await
        .context("pipeline worker panicked")??;
    store.flush()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    match summary.status {
        RunStatus::Failed => bail!(
            "run {} failed: {}",
            summary.run_id,
            summary.failure.as_deref().unwrap_or("unknown cause")
        ),
        status => {
            info!(run_id = %summary.run_id, status = ?status, "done");
            Ok(())
        }
    }
}

fn query_store(store_path: PathBuf, query: RiskQuery) -> Result<()> {
    let store = SledRiskStore::open(&store_path)
        .with_context(|| format!("opening store {}", store_path.display()))?;
    let records = store.query(&query)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    info!(records = records.len(), "query complete");
    Ok(())
}

fn handle_config(print_default: bool, check: Option<PathBuf>) -> Result<()> {
    if print_default {
        print!("{}", toml::to_string_pretty(&RunConfig::default())?);
        return Ok(());
    }
    let Some(path) = check else {
        bail!("nothing to do; pass --print-default or --check <path>");
    };
    let config = RunConfig::load(Some(&path))?;
    let registry = ScorerRegistry::from_config(&config.scoring)?;
    println!("{}: ok", path.display());
    for version in registry.versions() {
        let marker = if version.as_str() == config.scoring.version { " (active)" } else { "" };
        println!("  {version}{marker}");
    }
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}
