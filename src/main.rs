//! partwatch operator CLI
//!
//! ```text
//! partwatch seed-profiles
//! partwatch ingest --part P-1 --file p1.csv
//! partwatch run                 # every part: extract → forecast → classify
//! partwatch status --part P-1
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use partwatch::acquisition::read_csv_signal;
use partwatch::{PartStore, Pipeline, PipelineConfig, SledStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "partwatch")]
#[command(about = "Predictive maintenance for equipment parts: envelope features, ARIMA forecasts, condition scoring")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides $PARTWATCH_CONFIG and ./partwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory of the part store (overrides [storage].data_dir)
    #[arg(long, global = true, env = "PARTWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Write the configured threshold profiles into the store
    SeedProfiles,

    /// Append a `timestamp,value` CSV export to a part's signal
    Ingest {
        #[arg(long)]
        part: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Extract envelope features
    Extract {
        /// Single part (default: every part)
        #[arg(long)]
        part: Option<String>,
        /// Reference time for windowed feature kinds (RFC 3339, default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Forecast feature series
    Forecast {
        #[arg(long)]
        part: Option<String>,
    },

    /// Classify condition and compute percent condition
    Classify {
        #[arg(long)]
        part: Option<String>,
    },

    /// Full pipeline: extract, forecast, classify
    Run {
        #[arg(long)]
        part: Option<String>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Show the condition record and live forecast of parts
    Status {
        #[arg(long)]
        part: Option<String>,
    },
}

fn parts_to_process(store: &SledStore, part: Option<String>) -> Result<Vec<String>> {
    match part {
        Some(p) => Ok(vec![p]),
        None => store.list_parts().context("Failed to list parts"),
    }
}

fn print_status(store: &SledStore, config: &PipelineConfig, part_id: &str) -> Result<()> {
    println!("{part_id}");
    match store.read_condition_state(part_id)? {
        Some(state) => {
            println!("  status:            {}", state.status());
            if let Some(tof) = state.time_of_failure() {
                println!("  time of failure:   {}", tof.to_rfc3339());
            }
            if let Some(pc) = state.percent {
                println!("  percent condition: {:.2}", pc.percent_condition);
                println!("  warning percent:   {:.2}", pc.warning_percent);
            }
            println!("  updated:           {}", state.updated_at.to_rfc3339());
        }
        None => println!("  status:            (not classified)"),
    }

    for kind in config.feature_kinds.iter().filter(|k| k.forecast) {
        match store.read_forecast_batch(part_id, &kind.id)? {
            Some(batch) => {
                println!(
                    "  forecast {}: ARIMA{} AIC {:.2}, {} steps from {}",
                    kind.id,
                    batch.order,
                    batch.aic,
                    batch.len(),
                    batch.points.first().map(|p| p.timestamp.to_rfc3339()).unwrap_or_default()
                );
                if let Some(f) = batch.first_failure() {
                    println!("    projected failure: {} (value {:.2})", f.timestamp.to_rfc3339(), f.value);
                }
            }
            None => println!("  forecast {}: none", kind.id),
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn main() -> Result<()> {
    // .env may set PARTWATCH_CONFIG / PARTWATCH_DATA_DIR / RUST_LOG
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("partwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = PipelineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    let data_dir = args.data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    let store = SledStore::open(&data_dir)
        .with_context(|| format!("Failed to open part store at {}", data_dir.display()))?;
    let pipeline = Pipeline::new(&store, &config);

    match args.command {
        SubCommand::SeedProfiles => {
            let n = pipeline.seed_profiles()?;
            println!("seeded {n} threshold profiles");
        }

        SubCommand::Ingest { part, file } => {
            let import = read_csv_signal(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let written = store.append_signal(&part, &import.samples)?;
            info!(part_id = %part, written, skipped = import.skipped_rows, zero_filled = import.zero_filled, "📥 Signal ingested");
            println!("{part}: {written} readings ingested");
        }

        SubCommand::Extract { part, at } => {
            let now = at.unwrap_or_else(Utc::now);
            for part_id in parts_to_process(&store, part)? {
                match pipeline.extract_features(&part_id, now) {
                    Ok(kinds) => {
                        for k in kinds {
                            println!("{part_id} {}: {} points", k.feature_kind, k.written);
                        }
                    }
                    Err(e) => eprintln!("{part_id}: {e}"),
                }
            }
        }

        SubCommand::Forecast { part } => {
            let now = Utc::now();
            for part_id in parts_to_process(&store, part)? {
                for k in pipeline.forecast(&part_id, now) {
                    match k.batch {
                        Ok(b) => println!("{part_id} {}: ARIMA{} AIC {:.2}, {} steps", b.feature_kind, b.order, b.aic, b.len()),
                        Err(e) => eprintln!("{part_id} {}: {e}", k.feature_kind),
                    }
                }
            }
        }

        SubCommand::Classify { part } => {
            let now = Utc::now();
            for part_id in parts_to_process(&store, part)? {
                match pipeline.classify(&part_id, now) {
                    Ok(c) => println!(
                        "{part_id}: {} (percent {:.2}, warning {:.2})",
                        c.verdict.status(),
                        c.percent.percent_condition,
                        c.percent.warning_percent
                    ),
                    Err(e) => eprintln!("{part_id}: {e}"),
                }
            }
        }

        SubCommand::Run { part, at } => {
            let now = at.unwrap_or_else(Utc::now);
            let summary = match part {
                Some(p) => partwatch::RunSummary {
                    started_at: now,
                    parts: vec![pipeline.run_part(&p, now)],
                },
                None => pipeline.run_all(now)?,
            };
            for report in &summary.parts {
                for e in report.errors() {
                    eprintln!("{}: [{}] {e}", report.part_id, e.class());
                }
            }
            println!("{} parts ok, {} with failures", summary.succeeded(), summary.failed());
            if summary.parts.is_empty() {
                bail!("no parts in store at {}; ingest a signal first", data_dir.display());
            }
        }

        SubCommand::Status { part } => {
            for part_id in parts_to_process(&store, part)? {
                print_status(&store, &config, &part_id)?;
            }
        }
    }

    store.flush()?;
    Ok(())
}
