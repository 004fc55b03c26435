//! Run a single simulation or the convergence search:
//!
//! cargo run --release -- --preset quick-test --single
//!
//! cargo run --release -- --config run.json --tolerance 1e-3 --records
//!
//! Important: Disable obenblas multithreading:
//! ```text
//! export OPENBLAS_NUM_THREADS=1
//! ```
use clap::{Parser, ValueEnum};
use rustvort::config::{Preset, SimulationConfig};
use rustvort::convergence::{ConvergenceController, SimulationBackend};
use rustvort::hooks::LogObserver;
use rustvort::vorticity::SimulationRunner;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliPreset {
    QuickTest,
    Standard,
    HighResolution,
    ConvergenceStudy,
}

impl From<CliPreset> for Preset {
    fn from(value: CliPreset) -> Self {
        match value {
            CliPreset::QuickTest => Preset::QuickTest,
            CliPreset::Standard => Preset::Standard,
            CliPreset::HighResolution => Preset::HighResolution,
            CliPreset::ConvergenceStudy => Preset::ConvergenceStudy,
        }
    }
}

/// Vorticity solver with adaptive grid convergence search
#[derive(Parser, Debug)]
#[command(name = "rustvort", version, about)]
struct Cli {
    /// Json configuration file
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Start from a named configuration
    #[arg(long, value_enum)]
    preset: Option<CliPreset>,

    /// Accepted discrepancy of the search
    #[arg(long)]
    tolerance: Option<f64>,

    /// First resolution of the search
    #[arg(long)]
    n_initial: Option<usize>,

    /// Largest resolution of the search
    #[arg(long)]
    n_max: Option<usize>,

    /// Run once at the configured resolution instead of searching
    #[arg(long)]
    single: bool,

    /// Print the iteration log as json lines
    #[arg(long)]
    records: bool,

    /// Log filter, e.g. info or rustvort=debug (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &cli.log_level {
        builder.parse_filters(filter);
    }
    builder.init();

    if let Err(err) = run(&cli) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> rustvort::Result<SimulationConfig> {
    let mut config = match (&cli.config, cli.preset) {
        (Some(path), _) => SimulationConfig::from_json_file(path)?,
        (None, Some(preset)) => SimulationConfig::preset(preset.into()),
        (None, None) => SimulationConfig::default(),
    };
    if let Some(tol) = cli.tolerance {
        config.search.tolerance = tol;
    }
    if let Some(n) = cli.n_initial {
        config.search.n_initial = n;
    }
    if let Some(n) = cli.n_max {
        config.search.n_max = n;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> rustvort::Result<()> {
    let config = load_config(cli)?;
    let ic = config.initial_condition()?;

    if cli.single {
        let mut runner = SimulationRunner::new();
        let result = runner.run(
            &config.grid_params(),
            &config.physics_params(),
            &ic,
            &config.time_params(),
        )?;
        log::info!(
            "{} steps in {:.2}s, ok: {}",
            result.steps_taken,
            result.wall_time,
            result.run_ok
        );
        if let (Some(enstrophy), Some(peak)) = (result.enstrophy_trace.last(), result.peak_vorticity_trace.last()) {
            log::info!("final enstrophy {:.6e}, peak vorticity {:.6e}", enstrophy, peak);
        }
        return Ok(());
    }

    let backend = SimulationBackend::new(
        config.domain(),
        config.physics_params(),
        ic,
        config.time_params(),
    );
    let outcome = ConvergenceController::new(backend, config.search_settings())?
        .with_observer(Box::new(LogObserver))
        .run()?;

    if cli.records {
        for record in &outcome.iteration_log {
            println!("{}", serde_json::to_string(record)?);
        }
    }
    match (outcome.n_star, outcome.failure) {
        (Some(n), _) => log::info!("converged resolution: {}x{}", n, n),
        (None, Some(failure)) => log::warn!(
            "no converged resolution ({:?}), best passing: {:?}",
            failure.reason,
            failure.best_n
        ),
        (None, None) => {}
    }
    Ok(())
}
