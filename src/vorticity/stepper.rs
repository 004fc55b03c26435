//! Explicit time stepping of the vorticity equation
//! ..math:
//!  d omega / dt = - J(psi, omega) + nu laplacian(omega)
//!  laplacian(psi) = - omega
//!
//! J(psi, omega) denotes the advective term u . grad(omega), see
//! [`super::jacobian::arakawa`]. Time integration is the three stage strong
//! stability preserving Runge-Kutta scheme (Shu & Osher) with a fixed step
//! size. The streamfunction is refreshed by a Poisson solve at every stage.
use super::jacobian::arakawa;
use crate::error::{Result, VortError};
use crate::field::VorticityField;
use crate::grid::{GridSpec, Operators};
use crate::solver::{PoissonSolver, Solve};
use ndarray::{Array2, Zip};
use std::sync::Arc;

/// Finite difference RK3-SSP stepper
#[derive(Debug, Clone)]
pub struct FdStepper {
    grid: Arc<GridSpec>,
    poisson: Arc<PoissonSolver>,
    /// Viscosity
    pub nu: f64,
    /// Time step size
    pub dt: f64,
    psi: Array2<f64>,
}

impl FdStepper {
    /// Construct stepper on cached operators.
    ///
    /// # Errors
    /// `dt` not positive or `nu` negative / non-finite.
    pub fn new(ops: &Operators, nu: f64, dt: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.) {
            return Err(VortError::invalid(format!("dt must be positive, got {}", dt)));
        }
        if !(nu.is_finite() && nu >= 0.) {
            return Err(VortError::invalid(format!("nu must be non-negative, got {}", nu)));
        }
        Ok(Self {
            grid: ops.grid.clone(),
            poisson: ops.poisson.clone(),
            nu,
            dt,
            psi: Array2::zeros(ops.grid.shape()),
        })
    }

    /// Streamfunction of the last right hand side evaluation
    pub fn psi(&self) -> &Array2<f64> {
        &self.psi
    }

    /// Poisson solver of this stepper
    pub fn poisson(&self) -> &PoissonSolver {
        &self.poisson
    }

    /// Right hand side R(omega) = -J(psi, omega) + nu laplacian(omega)
    ///
    /// # Errors
    /// Shape mismatch in the poisson solve.
    pub fn rhs(&mut self, omega: &Array2<f64>) -> Result<Array2<f64>> {
        self.poisson.solve(omega, &mut self.psi)?;
        let advection = arakawa(omega, &self.psi, self.grid.dx(), self.grid.dy());
        let mut rhs = self.grid.laplacian().apply(omega);
        let nu = self.nu;
        Zip::from(&mut rhs)
            .and(&advection)
            .for_each(|r, &a| *r = nu * *r - a);
        Ok(rhs)
    }

    /// Advance `field` by one step of size dt.
    ///
    /// `step` (1-based) and `time` only label a divergence error.
    ///
    /// # Errors
    /// `Divergence` if a stage produces NaN or infinity. The field is left
    /// in an undefined state.
    pub fn step(&mut self, field: &mut VorticityField, step: usize, time: f64) -> Result<()> {
        if field.omega.dim() != self.grid.shape() {
            return Err(VortError::invalid(format!(
                "field {:?} does not match stepper grid {:?}",
                field.omega.dim(),
                self.grid.shape()
            )));
        }
        let dt = self.dt;
        let check = |w: &Array2<f64>, stage: usize| {
            if w.iter().all(|v| v.is_finite()) {
                Ok(())
            } else {
                Err(VortError::Divergence { step, time, stage })
            }
        };

        // Stage 1
        let r = self.rhs(&field.omega)?;
        let mut w1 = field.omega.clone();
        w1.scaled_add(dt, &r);
        check(&w1, 1)?;

        // Stage 2
        let r = self.rhs(&w1)?;
        let mut w2 = Array2::zeros(w1.raw_dim());
        Zip::from(&mut w2)
            .and(&field.omega)
            .and(&w1)
            .and(&r)
            .for_each(|w2, &w0, &w1, &r| *w2 = 0.75 * w0 + 0.25 * (w1 + dt * r));
        check(&w2, 2)?;

        // Stage 3
        let r = self.rhs(&w2)?;
        Zip::from(&mut field.omega)
            .and(&w2)
            .and(&r)
            .for_each(|w, &w2, &r| *w = *w / 3. + 2. / 3. * (w2 + dt * r));
        check(&field.omega, 3)
    }
}
