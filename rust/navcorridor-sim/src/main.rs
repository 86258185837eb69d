use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use navcorridor_core::RepairQuality;
use navcorridor_sim::config::Config;
use navcorridor_sim::runner::{SimOptions, Simulation};
use navcorridor_sim::scenario::{Scenario, ScenarioKind};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Quality {
    Low,
    High,
}

impl From<Quality> for RepairQuality {
    fn from(q: Quality) -> Self {
        match q {
            Quality::Low => RepairQuality::Low,
            Quality::High => RepairQuality::High,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "navcorridor-sim", version, about = "Drive a path corridor through a scripted scenario, one JSON report per frame")]
struct Args {
    /// Scenario to run
    #[arg(long, value_enum, default_value = "grid")]
    scenario: ScenarioKind,

    /// Frame budget
    #[arg(long, value_name = "N", default_value_t = 120)]
    frames: u32,

    /// Agent speed in world units per frame
    #[arg(long, default_value_t = 0.25)]
    speed: f64,

    /// Corners requested per frame, start point included
    #[arg(long = "max-corners", value_name = "N", default_value_t = 4)]
    max_corners: usize,

    /// Effort spent repairing the corridor ends
    #[arg(long, value_enum, default_value = "low")]
    quality: Quality,

    /// Tracer settings JSON (overrides NAVCORRIDOR_SETTINGS)
    #[arg(long = "settings", value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Frame reports output (defaults to stdout)
    #[arg(long = "out", value_name = "PATH")]
    out: Option<PathBuf>,

    /// JSON logs on stderr (or NAVCORRIDOR_LOG_JSON=1)
    #[arg(long = "json-logs")]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr).with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::from_env()?.with_overrides(args.settings.clone(), args.json_logs);
    init_logging(cfg.log_json);
    info!(?args, "starting navcorridor-sim");

    let settings = cfg.load_settings()?;
    if args.max_corners < 2 {
        anyhow::bail!("--max-corners must be at least 2, got {}", args.max_corners);
    }
    let options = SimOptions {
        frames: args.frames,
        speed: args.speed,
        max_corners: args.max_corners,
        quality: args.quality.into(),
        ..SimOptions::default()
    };

    let scenario = Scenario::build(args.scenario);
    let mut sim = Simulation::new(scenario, settings, options).context("planning the initial path")?;

    let sink: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {:?}", path))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);
    let mut write_err = None;
    let reports = sim.run(|report| {
        if write_err.is_some() {
            return;
        }
        let line = serde_json::to_writer(&mut out, report).map_err(io::Error::from).and_then(|_| writeln!(out));
        if let Err(e) = line {
            write_err = Some(e);
        }
    });
    if let Some(e) = write_err {
        error!(error = ?e, "failed to write frame reports");
        return Err(e).context("writing frame reports");
    }
    out.flush().context("flushing frame reports")?;

    let arrived = reports.last().map(|r| r.arrived).unwrap_or(false);
    info!(frames = reports.len(), arrived, replans = sim.replans(), "done");
    Ok(())
}
