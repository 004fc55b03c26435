//! Poisson Solver for the streamfunction
//!
//! # Description
//! Solve equations of the form:
//! ..math:
//!  (Dxx x Iy + Ix x Dyy) psi = -omega
//!
//! on a doubly periodic grid. Both 1-D operators are symmetric, so they are
//! diagonalized once by an eigendecomposition `D = Q lam Q^T`. The 2-D
//! inverse then reduces to a division in eigenspace:
//! ..math:
//!   psi = Qx [ (Qx^T f Qy) / (lam_x_i + lam_y_j) ] Qy^T
//!
//! The periodic laplacian has exactly one null mode (the constant). Its
//! coefficient is set to zero, which removes the mean of the right hand side
//! and fixes the gauge `mean(psi) = 0`.
use super::Solve;
use crate::error::{Result, VortError};
use crate::grid::{GridSpec, SparseMatrix};
use ndarray::{Array1, Array2, ArrayBase, Data, DataMut, Ix2, Zip};
use ndarray_linalg::{Eigh, UPLO};

/// Eigenvalues with |lam| below this fraction of the spectral radius
/// are treated as zero
const NULL_TOL: f64 = 1e-10;

/// Container for Poisson Solver
#[derive(Debug, Clone)]
pub struct PoissonSolver {
    qx: Array2<f64>,
    qy: Array2<f64>,
    /// 1 / (lam_x_i + lam_y_j), zero at the null mode
    inv_lam: Array2<f64>,
}

impl PoissonSolver {
    /// Factorize the laplacian of `grid`.
    ///
    /// # Errors
    /// `SingularSystem` if the eigendecomposition fails or the operator has
    /// more than one (or no) null mode.
    pub fn new(grid: &GridSpec) -> Result<Self> {
        let (lam_x, qx) = eigendecomposition(grid.second_difference(0))?;
        let (lam_y, qy) = eigendecomposition(grid.second_difference(1))?;

        let radius = lam_x
            .iter()
            .chain(lam_y.iter())
            .fold(0_f64, |acc, l| acc.max(l.abs()));
        let tol = NULL_TOL * radius;
        let mut n_null = 0;
        let inv_lam = Array2::from_shape_fn(grid.shape(), |(i, j)| {
            let lam = lam_x[i] + lam_y[j];
            if lam.abs() <= tol {
                n_null += 1;
                0.
            } else {
                1. / lam
            }
        });
        if n_null != 1 {
            return Err(VortError::SingularSystem(format!(
                "expected a single null mode, found {}",
                n_null
            )));
        }
        Ok(Self { qx, qy, inv_lam })
    }

    /// Shape of fields this solver accepts
    pub fn shape(&self) -> (usize, usize) {
        self.inv_lam.dim()
    }

    /// Return streamfunction of `omega`
    ///
    /// # Errors
    /// Shape mismatch.
    pub fn streamfunction<S: Data<Elem = f64>>(&self, omega: &ArrayBase<S, Ix2>) -> Result<Array2<f64>> {
        let mut psi = Array2::zeros(self.shape());
        self.solve(omega, &mut psi)?;
        Ok(psi)
    }
}

fn eigendecomposition(op: &SparseMatrix) -> Result<(Array1<f64>, Array2<f64>)> {
    op.to_dense()
        .eigh(UPLO::Lower)
        .map_err(|e| VortError::SingularSystem(format!("eigendecomposition failed: {}", e)))
}

impl Solve<f64, Ix2> for PoissonSolver {
    /// Solve laplacian(psi) = -input
    fn solve<S1, S2>(&self, input: &ArrayBase<S1, Ix2>, output: &mut ArrayBase<S2, Ix2>) -> Result<()>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64> + DataMut,
    {
        if input.dim() != self.shape() || output.dim() != self.shape() {
            return Err(VortError::invalid(format!(
                "poisson solver expects {:?}, got input {:?} and output {:?}",
                self.shape(),
                input.dim(),
                output.dim()
            )));
        }
        // Transform -omega into eigenspace
        let rhs = input.mapv(|v| -v);
        let mut hat = self.qx.t().dot(&rhs).dot(&self.qy);
        Zip::from(&mut hat).and(&self.inv_lam).for_each(|h, &l| *h *= l);
        // Back to physical space
        output.assign(&self.qx.dot(&hat).dot(&self.qy.t()));
        Ok(())
    }
}
