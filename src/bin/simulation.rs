//! Part Wear Simulation
//!
//! Generates an hourly sensor signal for one part as `timestamp,value` CSV,
//! ready for `partwatch ingest`. The signal is a duty-cycle oscillation on
//! top of a wear trend:
//! - Healthy: flat baseline, noise only
//! - Degrading: slow linear drift toward the warning boundary
//! - Failing: accelerating drift that crosses the failure boundary
//!
//! # Usage
//! ```bash
//! ./simulation --days 30 --scenario failing --seed 7 > p1.csv
//! partwatch ingest --part P-1 --file p1.csv
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

// ============================================================================
// Signal Constants
// ============================================================================

/// Healthy operating level
const BASELINE: f64 = 50.0;
/// Duty-cycle amplitude
const CYCLE_AMPLITUDE: f64 = 6.0;
/// Duty-cycle period (hours)
const CYCLE_HOURS: f64 = 8.0;
/// Level reached at the end of a degrading run
const DEGRADED_LEVEL: f64 = 78.0;
/// Level reached at the end of a failing run
const FAILED_LEVEL: f64 = 110.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Healthy,
    Degrading,
    Failing,
}

impl Scenario {
    fn name(self) -> &'static str {
        match self {
            Scenario::Healthy => "Healthy (baseline only)",
            Scenario::Degrading => "Degrading (linear wear)",
            Scenario::Failing => "Failing (accelerating wear)",
        }
    }

    /// Wear offset at `progress` in [0, 1].
    fn wear(self, progress: f64) -> f64 {
        match self {
            Scenario::Healthy => 0.0,
            Scenario::Degrading => (DEGRADED_LEVEL - BASELINE) * progress,
            Scenario::Failing => (FAILED_LEVEL - BASELINE) * progress.powi(3),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "partwatch-simulation")]
#[command(about = "Synthetic part sensor signal for partwatch testing")]
#[command(version)]
struct Args {
    /// Simulated duration in days
    #[arg(short, long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=365))]
    days: u32,

    /// Wear scenario
    #[arg(long, value_enum, default_value_t = Scenario::Degrading)]
    scenario: Scenario,

    /// Noise standard deviation
    #[arg(long, default_value = "1.5")]
    noise: f64,

    /// Fraction of readings left blank (exercises zero-fill on ingest)
    #[arg(long, default_value = "0.0")]
    gap_rate: f64,

    /// First timestamp (RFC 3339)
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress the run summary on stderr
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Generator
// ============================================================================

struct SignalGenerator {
    rng: StdRng,
    noise: Normal<f64>,
    scenario: Scenario,
    gap_rate: f64,
    total_hours: i64,
}

impl SignalGenerator {
    fn new(args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            noise: Normal::new(0.0, args.noise.max(0.0))?,
            scenario: args.scenario,
            gap_rate: args.gap_rate.clamp(0.0, 1.0),
            total_hours: i64::from(args.days) * 24,
        })
    }

    /// Reading for hour `h`; `None` is a dropped reading.
    fn reading(&mut self, h: i64) -> Option<f64> {
        if self.gap_rate > 0.0 && self.rng.gen_bool(self.gap_rate) {
            return None;
        }
        let progress = h as f64 / self.total_hours.max(1) as f64;
        let cycle = CYCLE_AMPLITUDE * (std::f64::consts::TAU * h as f64 / CYCLE_HOURS).sin();
        Some(BASELINE + self.scenario.wear(progress) + cycle + self.noise.sample(&mut self.rng))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut generator = SignalGenerator::new(&args)?;

    let start = args
        .start
        .unwrap_or_else(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now));

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    writeln!(out, "timestamp,value")?;
    let mut dropped = 0usize;
    let mut peak = f64::MIN;
    for h in 0..generator.total_hours {
        let ts = start + Duration::hours(h);
        match generator.reading(h) {
            Some(v) => {
                peak = peak.max(v);
                writeln!(out, "{},{v:.3}", ts.format("%Y-%m-%d %H:%M:%S"))?;
            }
            None => {
                dropped += 1;
                writeln!(out, "{},", ts.format("%Y-%m-%d %H:%M:%S"))?;
            }
        }
    }
    out.flush()?;

    if !args.quiet {
        eprintln!("{}", "=".repeat(60));
        eprintln!("PART WEAR SIMULATION");
        eprintln!("  Scenario: {}", args.scenario.name());
        eprintln!("  Readings: {} hourly ({} dropped)", generator.total_hours, dropped);
        eprintln!("  Peak:     {peak:.2}");
        if let Some(seed) = args.seed {
            eprintln!("  Seed:     {seed}");
        }
        eprintln!("{}", "=".repeat(60));
    }
    Ok(())
}
