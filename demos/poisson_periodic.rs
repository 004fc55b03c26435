//! # Periodic poisson problem
//! ```text
//! laplacian(psi) = - omega
//! ```
//! Solves for a single Fourier mode and compares with the exact
//! discrete solution.
//!
//! Run example:
//!
//! ```text
//! cargo run --example poisson_periodic --release
//! ```
use ndarray::Array2;
use rustvort::grid::GridSpec;
use rustvort::solver::{PoissonSolver, Solve};
use rustvort::vorticity::functions::norm_l2_diff;
use rustvort::Result;
use std::f64::consts::PI;

fn main() -> Result<()> {
    for &n in &[16, 32, 64, 128] {
        let grid = GridSpec::new(n, n, 1.0, 1.0)?;
        let solver = PoissonSolver::new(&grid)?;
        // one period over the n periodic points
        let (h, k) = (grid.dx(), 2. * PI / n as f64);
        let mode = Array2::from_shape_fn((n, n), |(i, j)| (k * i as f64).cos() * (k * j as f64).sin());
        // eigenvalue of the 5-point laplacian for this mode
        let lam = 2. * (2. - 2. * k.cos()) / (h * h);
        let omega = &mode * lam;
        let mut psi = Array2::<f64>::zeros((n, n));
        solver.solve(&omega, &mut psi)?;
        println!("n = {:4}  error = {:.3e}", n, norm_l2_diff(&psi, &mode));
    }
    Ok(())
}
