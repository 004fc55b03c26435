//! Bilinear interpolation between grids of the same periodic domain
use super::VorticityField;
use crate::error::{Result, VortError};
use crate::grid::GridSpec;
use ndarray::{Array2, Zip};

/// Position of target point `i` in source index space, split into
/// lower index, upper index (wrapped) and weight of the upper one.
fn stencil(i: usize, d_target: f64, d_source: f64, n_source: usize) -> (usize, usize, f64) {
    let s = i as f64 * (d_target / d_source);
    let lower = s.floor();
    let frac = s - lower;
    let lo = (lower as usize) % n_source;
    (lo, (lo + 1) % n_source, frac)
}

impl VorticityField {
    /// Sample this field on `target` with periodic bilinear interpolation.
    ///
    /// Points that coincide with source nodes are copied exactly, so
    /// interpolating onto the own grid is the identity.
    ///
    /// # Errors
    /// Grids discretize different domains.
    pub fn interpolate_onto(&self, target: &GridSpec) -> Result<Array2<f64>> {
        let source = &self.grid;
        if !source.same_domain(target) {
            return Err(VortError::invalid(format!(
                "cannot interpolate from {}x{} domain onto {}x{} domain",
                source.lx(),
                source.ly(),
                target.lx(),
                target.ly()
            )));
        }
        let sx: Vec<_> = (0..target.nx())
            .map(|i| stencil(i, target.dx(), source.dx(), source.nx()))
            .collect();
        let sy: Vec<_> = (0..target.ny())
            .map(|j| stencil(j, target.dy(), source.dy(), source.ny()))
            .collect();
        let w = &self.omega;
        let mut out = Array2::zeros(target.shape());
        Zip::indexed(&mut out).par_for_each(|(i, j), v| {
            let (i0, i1, fx) = sx[i];
            let (j0, j1, fy) = sy[j];
            *v = (1. - fx) * (1. - fy) * w[[i0, j0]]
                + fx * (1. - fy) * w[[i1, j0]]
                + (1. - fx) * fy * w[[i0, j1]]
                + fx * fy * w[[i1, j1]];
        });
        Ok(out)
    }
}
