//! reftrack scenario replayer
//!
//! Replays a JSON scenario of scope and async-update operations against a
//! fresh reference cache and prints the report as JSON.
//!
//! Usage:
//!   reftrack-replay scenarios/blog.json --verbose

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use reftrack_cache::CacheSettings;
use reftrack_replay::{Scenario, run};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "reftrack-replay")]
#[command(about = "Replay reference cache scenarios")]
struct Args {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Settings file overriding the scenario's own settings
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Trace every entity visited by a walk
    #[arg(long)]
    trace: bool,

    /// Print the report on a single line
    #[arg(long)]
    compact: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.trace {
        Level::TRACE
    } else if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("failed to load scenario {}", args.scenario.display()))?;

    if let Some(path) = &args.settings {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        scenario.settings = CacheSettings::from_json_str(&text)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
    }
    if args.trace {
        scenario.settings.trace = true;
    }

    info!(steps = scenario.steps.len(), "replaying scenario");
    let report = run(&scenario).context("scenario replay failed")?;

    let out = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{out}");
    Ok(())
}
