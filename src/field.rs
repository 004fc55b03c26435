//! # Vorticity field
//!
//! Scalar vorticity `omega` sampled on a [`GridSpec`]. The array has shape
//! `(nx, ny)`, `omega[[i, j]]` lives at `(x[i], y[j])`.
//!
//! Initial conditions are described by [`InitialCondition`], vortex
//! placement for multi vortex setups by [`DispersionPattern`].
pub mod dispersion;
pub mod initial;
pub mod interpolate;
pub use dispersion::DispersionPattern;
pub use initial::{IcKind, InitialCondition, VorticityProfile};

use crate::error::{Result, VortError};
use crate::grid::GridSpec;
use ndarray::{Array2, ArrayBase, Data, Ix2};
use std::sync::Arc;

/// Vorticity on a periodic grid
#[derive(Debug, Clone)]
pub struct VorticityField {
    /// Grid the field lives on
    pub grid: Arc<GridSpec>,
    /// Vorticity values, shape (nx, ny)
    pub omega: Array2<f64>,
}

impl VorticityField {
    /// Zero field
    pub fn zeros(grid: Arc<GridSpec>) -> Self {
        let omega = Array2::zeros(grid.shape());
        Self { grid, omega }
    }

    /// Wrap existing values.
    ///
    /// # Errors
    /// Shape of `omega` does not match the grid.
    pub fn from_array(grid: Arc<GridSpec>, omega: Array2<f64>) -> Result<Self> {
        if omega.dim() != grid.shape() {
            return Err(VortError::invalid(format!(
                "field of shape {:?} on grid {:?}",
                omega.dim(),
                grid.shape()
            )));
        }
        Ok(Self { grid, omega })
    }

    /// Sample an initial condition on the grid
    pub fn from_initial(grid: Arc<GridSpec>, ic: &InitialCondition) -> Self {
        let mut field = Self::zeros(grid);
        ic.fill(&field.grid, &mut field.omega);
        field
    }

    /// Largest absolute vorticity
    pub fn peak(&self) -> f64 {
        peak_abs(&self.omega)
    }

    /// Integral of squared vorticity
    pub fn enstrophy(&self) -> f64 {
        self.omega.iter().map(|w| w * w).sum::<f64>() * self.grid.cell_area()
    }

    /// Integral of vorticity
    pub fn circulation(&self) -> f64 {
        self.omega.sum() * self.grid.cell_area()
    }

    /// Kinetic energy 1/2 int psi omega dA for a matching streamfunction
    pub fn kinetic_energy<S: Data<Elem = f64>>(&self, psi: &ArrayBase<S, Ix2>) -> f64 {
        0.5 * self
            .omega
            .iter()
            .zip(psi.iter())
            .map(|(w, p)| w * p)
            .sum::<f64>()
            * self.grid.cell_area()
    }

    /// False if any value is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.omega.iter().all(|v| v.is_finite())
    }
}

/// Max |v| of an array, NaN propagates
pub fn peak_abs<S: Data<Elem = f64>>(array: &ArrayBase<S, Ix2>) -> f64 {
    array.iter().fold(0., |acc: f64, v| {
        if v.is_nan() || acc.is_nan() {
            f64::NAN
        } else {
            acc.max(v.abs())
        }
    })
}
