//! g4tpc-sim - run configuration front end
//!
//! Loads and validates a run configuration, reads genie input when requested,
//! and reports the event plan the transport engine will execute. Fatal
//! configuration problems are logged and give a non-zero exit status.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use g4tpc_common::config::resolve_config_path;
use g4tpc_common::{RunConfig, RunSetup};
use g4tpc_sim::primary::{plan_primaries, PrimaryParticle};
use g4tpc_sim::SimulationSession;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info, warn};

/// Command-line arguments for g4tpc-sim
#[derive(Parser, Debug)]
#[command(name = "g4tpc-sim")]
#[command(about = "LArTPC simulation bookkeeping: configuration check and event planning")]
#[command(version)]
struct Args {
    /// Run configuration file (falls back to G4TPC_CONFIG, then ./g4tpc.toml)
    config: Option<PathBuf>,

    /// Print the primaries planned for the first EVENTS events as JSON
    #[arg(long, value_name = "EVENTS")]
    primaries: Option<usize>,

    /// Seed for particle-gun sampling
    #[arg(long, env = "G4TPC_SEED")]
    seed: Option<u64>,

    /// Log level, overriding the configuration file (RUST_LOG takes precedence)
    #[arg(long, env = "G4TPC_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Serialize)]
struct EventPlan {
    event: usize,
    primaries: Vec<PrimaryParticle>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config.as_deref());

    let level = args
        .log_level
        .clone()
        .or_else(|| config_path.as_deref().ok().and_then(configured_log_level))
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("g4tpc_sim={level},g4tpc_common={level}").into()),
        )
        .init();

    info!(
        "Starting g4tpc-sim v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match run(&args, config_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

/// `[logging] level` from a config file, without validating the rest
fn configured_log_level(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    RunConfig::from_toml_str(&text).ok().map(|c| c.logging.level)
}

fn run(args: &Args, config_path: g4tpc_common::Result<PathBuf>) -> Result<()> {
    let config_path = config_path.context("Failed to locate run configuration")?;
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("Invalid run configuration {}", config_path.display()))?;
    let setup = RunSetup::prepare(config).context("Failed to prepare run")?;

    if setup.genie_parse_errors > 0 {
        warn!("{} malformed genie lines skipped", setup.genie_parse_errors);
    }

    let session = SimulationSession::new(&setup).context("Invalid readout configuration")?;
    let events = setup.events_to_process();

    info!("Primary source: {:?}", setup.config.primary_source());
    info!("Events to process: {}", events);
    info!("Output: {}", setup.config.output_path.display());
    info!(
        "Detector: center {:?} width {:?}, {} layers per axis",
        session.detector().center(),
        session.detector().width(),
        session.detector().n_layers()
    );
    if let Some(lartpc) = &setup.config.lartpc {
        info!(
            "LArTPC readout: {}, hits {}",
            if lartpc.dual_phase { "dual phase" } else { "single phase" },
            if lartpc.write_hits { "written" } else { "not written" }
        );
    }

    if let Some(requested) = args.primaries {
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let plans = (0..requested.min(events))
            .map(|event| {
                plan_primaries(&setup, event, &mut rng).map(|primaries| EventPlan { event, primaries })
            })
            .collect::<g4tpc_common::Result<Vec<_>>>()
            .context("Failed to plan primaries")?;

        println!(
            "{}",
            serde_json::to_string_pretty(&plans).context("Failed to serialize primaries")?
        );
    }

    info!("Configuration ready");
    Ok(())
}
