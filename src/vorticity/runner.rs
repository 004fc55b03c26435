//! Run a full simulation at one resolution
//!
//! [`SimulationRunner::run`] builds (or fetches from its cache) the grid and
//! poisson operators, samples the initial condition and integrates
//! `ceil(t_final / dt)` steps. Snapshots with enstrophy, peak vorticity,
//! kinetic energy and cfl number are recorded at step 0, every
//! `snapshot_every` steps and at the final step.
//!
//! A diverging run is not an error at this level: the result carries
//! `run_ok = false`, `error_kind = Some(ErrorKind::Divergence)` and all
//! snapshots taken before the failure.
use super::functions::cfl;
use super::stepper::FdStepper;
use crate::error::{ErrorKind, Result, VortError};
use crate::field::{InitialCondition, VorticityField};
use crate::grid::{GridSpec, OperatorCache};
use crate::{integrate, Integrate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Grid size and domain of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Points along x
    pub n_x: usize,
    /// Points along y
    pub n_y: usize,
    /// Domain length along x
    pub lx: f64,
    /// Domain length along y
    pub ly: f64,
}

impl GridParams {
    /// n x n points on a lx x ly domain
    pub fn square(n: usize, lx: f64, ly: f64) -> Self {
        Self {
            n_x: n,
            n_y: n,
            lx,
            ly,
        }
    }
}

/// Physical parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Kinematic viscosity
    pub nu: f64,
}

/// Time stepping parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeParams {
    /// Final time
    pub t_final: f64,
    /// Step size
    pub dt: f64,
    /// Record a snapshot every this many steps
    pub snapshot_every: usize,
}

/// Field at one instant
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Step index, 0 is the initial condition
    pub step: usize,
    /// Simulation time
    pub time: f64,
    /// Vorticity
    pub field: VorticityField,
}

/// Outcome of a single simulation
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Grid of the run
    pub grid: Arc<GridSpec>,
    /// Snapshots in chronological order
    pub omega_snapshots: Vec<Snapshot>,
    /// Integral of omega^2 per snapshot
    pub enstrophy_trace: Vec<f64>,
    /// Max |omega| per snapshot
    pub peak_vorticity_trace: Vec<f64>,
    /// Kinetic energy per snapshot
    pub energy_trace: Vec<f64>,
    /// Cfl number per snapshot
    pub cfl_trace: Vec<f64>,
    /// Wall clock time in seconds
    pub wall_time: f64,
    /// Steps completed
    pub steps_taken: usize,
    /// False if the run diverged
    pub run_ok: bool,
    /// Reason of failure
    pub error_kind: Option<ErrorKind>,
}

impl SimulationResult {
    /// Last recorded field
    pub fn final_field(&self) -> Option<&VorticityField> {
        self.omega_snapshots.last().map(|s| &s.field)
    }

    /// Times of all snapshots
    pub fn times(&self) -> Vec<f64> {
        self.omega_snapshots.iter().map(|s| s.time).collect()
    }
}

/// Simulation state driven by [`integrate`]
struct VorticitySimulation<'a> {
    stepper: FdStepper,
    field: VorticityField,
    step: usize,
    time: f64,
    snapshots: Vec<Snapshot>,
    enstrophy: Vec<f64>,
    peak: Vec<f64>,
    energy: Vec<f64>,
    cfl: Vec<f64>,
    on_snapshot: &'a mut dyn FnMut(&VorticityField, f64),
}

impl<'a> Integrate for VorticitySimulation<'a> {
    fn update(&mut self) -> Result<()> {
        self.stepper.step(&mut self.field, self.step + 1, self.time)?;
        self.step += 1;
        self.time = self.step as f64 * self.stepper.dt;
        Ok(())
    }

    fn get_time(&self) -> f64 {
        self.time
    }

    fn get_dt(&self) -> f64 {
        self.stepper.dt
    }

    fn callback(&mut self) -> Result<()> {
        let psi = self.stepper.poisson().streamfunction(&self.field.omega)?;
        let grid = &self.field.grid;
        self.enstrophy.push(self.field.enstrophy());
        self.peak.push(self.field.peak());
        self.energy.push(self.field.kinetic_energy(&psi));
        self.cfl
            .push(cfl(&psi, grid.dx(), grid.dy(), self.stepper.dt));
        log::debug!(
            "t = {:8.4}  enstrophy = {:10.4e}  peak = {:10.4e}",
            self.time,
            self.enstrophy[self.enstrophy.len() - 1],
            self.peak[self.peak.len() - 1]
        );
        (self.on_snapshot)(&self.field, self.time);
        self.snapshots.push(Snapshot {
            step: self.step,
            time: self.time,
            field: self.field.clone(),
        });
        Ok(())
    }
}

/// Runs simulations and caches grid operators between runs
#[derive(Debug, Default)]
pub struct SimulationRunner {
    cache: OperatorCache,
}

impl SimulationRunner {
    /// Runner with an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached operators
    pub fn cache(&self) -> &OperatorCache {
        &self.cache
    }

    /// Run a simulation, see [`SimulationRunner::run_observed`]
    ///
    /// # Errors
    /// See [`SimulationRunner::run_observed`]
    pub fn run(
        &mut self,
        grid: &GridParams,
        physics: &PhysicsParams,
        ic: &InitialCondition,
        time: &TimeParams,
    ) -> Result<SimulationResult> {
        self.run_observed(grid, physics, ic, time, &mut |_, _| {})
    }

    /// Run a simulation and call `on_snapshot(field, time)` for every
    /// recorded snapshot.
    ///
    /// # Errors
    /// `InvalidParameter` for `nu <= 0`, `dt <= 0`, negative `t_final` or
    /// `snapshot_every == 0`; `InvalidGrid`; `SingularSystem`; `NonFinite`
    /// if the initial condition is not finite. Divergence is reported in
    /// the returned result instead.
    pub fn run_observed(
        &mut self,
        grid: &GridParams,
        physics: &PhysicsParams,
        ic: &InitialCondition,
        time: &TimeParams,
        on_snapshot: &mut dyn FnMut(&VorticityField, f64),
    ) -> Result<SimulationResult> {
        if !(physics.nu.is_finite() && physics.nu > 0.) {
            return Err(VortError::invalid(format!("nu must be positive, got {}", physics.nu)));
        }
        if time.snapshot_every == 0 {
            return Err(VortError::invalid("snapshot_every must be at least 1"));
        }
        crate::num_timesteps(time.t_final, time.dt)?;

        let ops = self.cache.get_or_build(grid.n_x, grid.n_y, grid.lx, grid.ly)?;
        let field = VorticityField::from_initial(ops.grid.clone(), ic);
        if !field.is_finite() {
            return Err(VortError::NonFinite("initial condition".to_string()));
        }
        let stepper = FdStepper::new(&ops, physics.nu, time.dt)?;
        let mut sim = VorticitySimulation {
            stepper,
            field,
            step: 0,
            time: 0.,
            snapshots: vec![],
            enstrophy: vec![],
            peak: vec![],
            energy: vec![],
            cfl: vec![],
            on_snapshot,
        };

        log::info!(
            "run {}x{} grid, dt = {:.3e}, t_final = {}",
            grid.n_x,
            grid.n_y,
            time.dt,
            time.t_final
        );
        let timer = Instant::now();
        sim.callback()?;
        let (run_ok, error_kind) = match integrate(&mut sim, time.t_final, Some(time.snapshot_every)) {
            Ok(_) => (true, None),
            Err(err @ VortError::Divergence { .. }) => {
                log::warn!("{}x{} run stopped: {}", grid.n_x, grid.n_y, err);
                (false, Some(ErrorKind::Divergence))
            }
            Err(err) => return Err(err),
        };
        let wall_time = timer.elapsed().as_secs_f64();

        Ok(SimulationResult {
            grid: ops.grid,
            omega_snapshots: sim.snapshots,
            enstrophy_trace: sim.enstrophy,
            peak_vorticity_trace: sim.peak,
            energy_trace: sim.energy,
            cfl_trace: sim.cfl,
            wall_time,
            steps_taken: sim.step,
            run_ok,
            error_kind,
        })
    }
}
