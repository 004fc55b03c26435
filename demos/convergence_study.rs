//! # Grid convergence of a Taylor-Green flow
//!
//! Searches the coarsest resolution whose final vorticity agrees with its
//! neighbour within the tolerance and prints the iteration log as json.
//!
//! Run example:
//!
//! ```text
//! cargo run --example convergence_study --release
//! ```
use rustvort::config::{Preset, SimulationConfig};
use rustvort::convergence::{ConvergenceController, ConvergencePoint, SimulationBackend};
use rustvort::field::VorticityField;
use rustvort::hooks::ConvergenceObserver;
use rustvort::Result;

#[derive(Default)]
struct Progress {
    snapshots: usize,
}

impl ConvergenceObserver for Progress {
    fn on_resolution_tested(&mut self, point: &ConvergencePoint) {
        println!(
            "N = {:4}  metric = {:.3e}  ({} snapshots)",
            point.n, point.metric_value, self.snapshots
        );
        self.snapshots = 0;
    }

    fn on_snapshot(&mut self, _field: &VorticityField, _time: f64) {
        self.snapshots += 1;
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let mut config = SimulationConfig::preset(Preset::ConvergenceStudy);
    config.lx = 2. * std::f64::consts::PI;
    config.ly = config.lx;
    config.t_final = 0.2;
    config.dt = 1e-3;
    config.search.n_initial = 16;
    config.search.n_max = 256;
    config.search.tolerance = 5e-3;
    config.validate()?;

    let backend = SimulationBackend::new(
        config.domain(),
        config.physics_params(),
        config.initial_condition()?,
        config.time_params(),
    );
    let outcome = ConvergenceController::new(backend, config.search_settings())?
        .with_observer(Box::new(Progress::default()))
        .run()?;
    for record in &outcome.iteration_log {
        println!("{}", serde_json::to_string(record)?);
    }
    println!("converged: {}  N* = {:?}", outcome.converged, outcome.n_star);
    Ok(())
}
