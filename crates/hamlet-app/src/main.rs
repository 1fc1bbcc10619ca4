//! Headless runner: advances a hamlet for a fixed number of ticks and dumps
//! the event ledger as JSON for external charting.

use std::fs;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use hamlet_core::{HamletConfig, ReportSink, Simulation, TickReport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u64 = 200;
const LEDGER_PATH: &str = "hamlet-events.json";

/// Tracks the largest living population seen across the run.
#[derive(Debug, Default)]
struct PeakTracker {
    peak: Arc<Mutex<usize>>,
}

impl ReportSink for PeakTracker {
    fn on_tick(&mut self, report: &TickReport) {
        if let Ok(mut peak) = self.peak.lock() {
            if report.living > *peak {
                *peak = report.living;
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw
                .parse::<u64>()
                .with_context(|| format!("{key} must be an unsigned integer, got {raw:?}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

fn main() -> Result<()> {
    init_tracing();

    let ticks = env_u64("HAMLET_TICKS")?.unwrap_or(DEFAULT_TICKS);
    let config = HamletConfig {
        rng_seed: env_u64("HAMLET_SEED")?,
        ..HamletConfig::default()
    };

    let peak = Arc::new(Mutex::new(0_usize));
    let tracker = PeakTracker { peak: Arc::clone(&peak) };
    let mut sim = Simulation::new(config).context("configuring simulation")?;
    sim.set_sink(Box::new(tracker));

    info!(
        people = sim.people().len(),
        seed = ?sim.config().rng_seed,
        ticks,
        "hamlet bootstrapped"
    );

    for _ in 0..ticks {
        let report = sim.advance_tick();
        info!(
            tick = report.tick.0,
            births = report.births,
            deaths = report.deaths,
            pubescences = report.pubescences,
            marriages = report.marriages,
            interactions = report.interactions,
            living = report.living,
            "tick complete"
        );
        if report.living == 0 {
            warn!(tick = report.tick.0, "population extinct, stopping early");
            break;
        }
    }

    let json = serde_json::to_string_pretty(sim.ledger()).context("serializing event ledger")?;
    fs::write(LEDGER_PATH, json).with_context(|| format!("writing {LEDGER_PATH}"))?;

    let peak = peak.lock().map(|p| *p).unwrap_or(0);
    info!(
        ticks = sim.tick().0,
        total_people = sim.people().len(),
        living = sim.living_count(),
        peak_population = peak,
        ledger = LEDGER_PATH,
        "run finished"
    );
    Ok(())
}
