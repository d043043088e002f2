/// Command-line driver for landscape evolution runs: start a run from a JSON
/// configuration, resume one from its checkpoint, or write a default
/// configuration to edit.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lem_core::{calc_k_u_d, RunConfig, RunSummary, Simulation};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lem-run", version, about = "Landscape evolution model driver")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Integrate a new run from its generated initial surface
    Run(RunArgs),
    /// Resume a run from `<output_dir>/<run_name>_checkpoint.p`
    Restart(RunArgs),
    /// Write the default configuration as JSON
    InitConfig {
        #[arg(short, long, default_value = "lem.json")]
        output: PathBuf,
    },
    /// Print the derived K, U and D for a configuration
    Constants {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Run configuration (JSON). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured run name
    #[arg(long)]
    run_name: Option<String>,

    /// Override the configured output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn load_config(path: Option<&PathBuf>) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(RunConfig::default()),
    }
}

fn resolve(args: &RunArgs) -> Result<RunConfig> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(name) = &args.run_name {
        config.run_name = name.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    config.validate().context("invalid run configuration")?;
    Ok(config)
}

fn report(summary: &RunSummary) -> Result<()> {
    if !summary.result.success {
        bail!("integration did not finish: {}", summary.result.message);
    }
    let last_flux = summary.observer.flux.last().copied().unwrap_or(f64::NAN);
    info!(
        evaluations = summary.evaluations,
        outputs = summary.result.t.len(),
        flux_fraction = last_flux,
        results = %summary.results_path.display(),
        "done"
    );
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => {
            let config = resolve(&args)?;
            let sim = Simulation::from_config(config).context("building simulation")?;
            let summary = sim.run().context("run failed")?;
            report(&summary)
        }
        Command::Restart(args) => {
            let config = resolve(&args)?;
            let sim = Simulation::restart(config).context("restoring checkpoint")?;
            info!(t0 = sim.start_time(), t_end = sim.end_time(), "resuming");
            let summary = sim.run().context("restarted run failed")?;
            report(&summary)
        }
        Command::InitConfig { output } => {
            RunConfig::default()
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), "default configuration written");
            Ok(())
        }
        Command::Constants { config } => {
            let config = load_config(config.as_ref())?;
            let constants = calc_k_u_d(&config.stream_power).context("deriving constants")?;
            println!("{}", serde_json::to_string_pretty(&constants)?);
            Ok(())
        }
    }
}
