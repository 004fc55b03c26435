//! # `rustvort`: Vorticity solver with adaptive grid convergence search
//!<img align="right" src="https://rustacean.net/assets/cuddlyferris.png" width="80">
//!
//! # Dependencies
//! - cargo >= v1.70
//! - a lapack backend for `ndarray-linalg` (openblas by default)
//!
//! # Important
//!
//! Openblas multithreading conflicts with internal multithreading.
//! Turn it off for better performance:
//! ```text
//! export OPENBLAS_NUM_THREADS=1
//! ```
//!
//! # Details
//!
//! Solves the two dimensional incompressible vorticity-streamfunction
//! equations on a doubly periodic grid
//! ..math:
//!  d omega / dt = - J(psi, omega) + nu laplacian(omega)
//!  laplacian(psi) = - omega
//!
//! with second order finite differences (Arakawa jacobian, 5-point
//! laplacian) and a three stage SSP Runge-Kutta scheme, see [`vorticity`].
//!
//! On top of the solver sits a search for the coarsest grid whose solution
//! agrees with its neighbours within a tolerance, see [`convergence`].
//! It combines Richardson extrapolation with bracketing and a binary search.
//!
//! # Example
//! Single simulation of a gaussian vortex
//! ```no_run
//! use rustvort::field::{IcKind, InitialCondition};
//! use rustvort::vorticity::{GridParams, PhysicsParams, SimulationRunner, TimeParams};
//!
//! let ic = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, 0.5, 0.0, 0.0]).unwrap();
//! let grid = GridParams::square(64, 4.0, 4.0);
//! let physics = PhysicsParams { nu: 1e-3 };
//! let time = TimeParams { t_final: 1.0, dt: 1e-2, snapshot_every: 10 };
//! let mut runner = SimulationRunner::new();
//! let result = runner.run(&grid, &physics, &ic, &time).unwrap();
//! assert!(result.run_ok);
//! ```
//! Search for a converged resolution
//! ```no_run
//! use rustvort::convergence::find_converged_resolution;
//! use rustvort::field::{IcKind, InitialCondition};
//! use rustvort::vorticity::{PhysicsParams, TimeParams};
//!
//! let ic = InitialCondition::from_coefficients(IcKind::TaylorGreen, &[1.0, 1.0]).unwrap();
//! let physics = PhysicsParams { nu: 1e-3 };
//! let time = TimeParams { t_final: 0.5, dt: 1e-3, snapshot_every: 100 };
//! let outcome = find_converged_resolution(16, 256, 1e-2, [6.28, 6.28], &physics, &ic, &time).unwrap();
//! println!("converged: {} at N = {:?}", outcome.converged, outcome.n_star);
//! ```
//!
//! ## Documentation
//!
//! Download and run:
//!
//! `cargo doc --open`
#![warn(missing_docs)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#[macro_use]
extern crate enum_dispatch;
pub mod config;
pub mod convergence;
pub mod error;
pub mod field;
pub mod grid;
pub mod hooks;
pub mod solver;
pub mod vorticity;

pub use error::{Result, VortError};

const MAX_TIMESTEP: usize = 10_000_000;

/// Integrate trait, step forward in time, and write results
pub trait Integrate {
    /// Update solution
    ///
    /// # Errors
    /// Solution became invalid, e.g. diverged.
    fn update(&mut self) -> Result<()>;
    /// Receive current time
    fn get_time(&self) -> f64;
    /// Get timestep
    fn get_dt(&self) -> f64;
    /// Callback function (can be used for i/o)
    ///
    /// # Errors
    /// Diagnostics could not be evaluated.
    fn callback(&mut self) -> Result<()>;
}

/// Number of fixed size steps to reach `max_time`, `ceil(max_time / dt)`.
///
/// The quotient is allowed a relative slack of 1e-9 before rounding up, so
/// that e.g. `0.1 / 0.01` gives 10 and not 11 steps.
///
/// # Errors
/// `dt` not positive, `max_time` negative or the step count exceeds the
/// internal limit.
///
/// # Example
/// ```
/// assert_eq!(rustvort::num_timesteps(0.1, 0.01).unwrap(), 10);
/// assert_eq!(rustvort::num_timesteps(0.105, 0.01).unwrap(), 11);
/// assert_eq!(rustvort::num_timesteps(0., 0.01).unwrap(), 0);
/// ```
pub fn num_timesteps(max_time: f64, dt: f64) -> Result<usize> {
    if !(dt.is_finite() && dt > 0.) {
        return Err(VortError::invalid(format!("dt must be positive, got {}", dt)));
    }
    if !(max_time.is_finite() && max_time >= 0.) {
        return Err(VortError::invalid(format!(
            "final time must be non-negative, got {}",
            max_time
        )));
    }
    let ratio = max_time / dt;
    let steps = (ratio - 1e-9 * ratio.max(1.)).ceil().max(0.);
    if steps > MAX_TIMESTEP as f64 {
        return Err(VortError::invalid(format!(
            "{} steps exceed the limit of {}",
            steps, MAX_TIMESTEP
        )));
    }
    Ok(steps as usize)
}

/// Integrade pde, that implements the Integrate trait.
///
/// Runs `ceil(max_time / dt)` steps. The callback is invoked every
/// `save_every` steps and after the final step. Returns the number of
/// steps taken.
///
/// # Errors
/// Invalid time parameters, or the first error of `update` / `callback`.
/// Steps completed before the error are kept in `pde`.
pub fn integrate<T: Integrate>(pde: &mut T, max_time: f64, save_every: Option<usize>) -> Result<usize> {
    let n_steps = num_timesteps(max_time, pde.get_dt())?;
    let mut timestep: usize = 0;
    while timestep < n_steps {
        // Update
        pde.update()?;
        timestep += 1;

        // Save
        let save = save_every.map_or(false, |every| every > 0 && timestep % every == 0);
        if save || timestep == n_steps {
            pde.callback()?;
        }
    }
    log::debug!("time limit reached: {:?}", pde.get_time());
    Ok(timestep)
}
