//! # Linear solver
//!
//! Currently a single solver is implemented, the [`PoissonSolver`] for the
//! periodic streamfunction problem.
#![allow(clippy::module_name_repetitions)]
pub mod poisson;
pub use poisson::PoissonSolver;

use crate::error::Result;
use ndarray::{ArrayBase, Data, DataMut};

/// Solve linear algebraix systems of the form: M x = b.
pub trait Solve<A, D> {
    /// Solves M x = b and writes x into output.
    /// Output (x) matches input (b) in type and size.
    ///
    /// # Errors
    /// Shape mismatch between input, output and operator.
    fn solve<S1, S2>(&self, input: &ArrayBase<S1, D>, output: &mut ArrayBase<S2, D>) -> Result<()>
    where
        S1: Data<Elem = A>,
        S2: Data<Elem = A> + DataMut;
}
