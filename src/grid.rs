//! # Doubly periodic cartesian grid
//!
//! A `GridSpec` describes `nx x ny` points on `[-lx/2, lx/2] x [-ly/2, ly/2]`
//! with spacing `dx = lx / (nx - 1)`, `dy = ly / (ny - 1)`. Neighbours wrap
//! around, i.e. index `nx` is index `0`.
//!
//! The grid owns the 1-D second difference operators and the sparse
//! 5-point Laplacian built from them. Grids are immutable once constructed
//! and are shared via `Arc`, see [`OperatorCache`].
pub mod cache;
pub mod laplacian;
pub use cache::{OperatorCache, Operators};
pub use laplacian::SparseMatrix;

use crate::error::{Result, VortError};
use ndarray::Array1;

/// Smallest number of points per direction
pub const MIN_POINTS: usize = 4;

/// Grid geometry and finite difference operators
#[derive(Debug, Clone)]
pub struct GridSpec {
    nx: usize,
    ny: usize,
    lx: f64,
    ly: f64,
    dx: f64,
    dy: f64,
    dxx: SparseMatrix,
    dyy: SparseMatrix,
    laplacian: SparseMatrix,
}

impl GridSpec {
    /// Construct grid and assemble its laplacian.
    ///
    /// # Errors
    /// `InvalidGrid` if `nx` or `ny` is smaller than 4, or a domain length
    /// is not a positive finite number.
    ///
    /// # Example
    /// ```
    /// use rustvort::grid::GridSpec;
    /// let grid = GridSpec::new(11, 6, 1.0, 2.5).unwrap();
    /// assert_eq!(grid.dx(), 0.1);
    /// assert_eq!(grid.dy(), 0.5);
    /// ```
    pub fn new(nx: usize, ny: usize, lx: f64, ly: f64) -> Result<Self> {
        if nx < MIN_POINTS || ny < MIN_POINTS {
            return Err(VortError::InvalidGrid {
                nx,
                ny,
                reason: format!("at least {} points per direction required", MIN_POINTS),
            });
        }
        if !(lx.is_finite() && ly.is_finite() && lx > 0. && ly > 0.) {
            return Err(VortError::InvalidGrid {
                nx,
                ny,
                reason: format!("domain lengths must be positive, got {} x {}", lx, ly),
            });
        }
        let dx = lx / (nx - 1) as f64;
        let dy = ly / (ny - 1) as f64;
        let dxx = SparseMatrix::periodic_second_difference(nx, dx);
        let dyy = SparseMatrix::periodic_second_difference(ny, dy);
        let laplacian = laplacian::laplacian_2d(&dxx, &dyy);
        Ok(Self {
            nx,
            ny,
            lx,
            ly,
            dx,
            dy,
            dxx,
            dyy,
            laplacian,
        })
    }

    /// Square grid with n x n points
    pub fn square(n: usize, lx: f64, ly: f64) -> Result<Self> {
        Self::new(n, n, lx, ly)
    }

    /// Points along x
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Points along y
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Shape of fields living on this grid
    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Domain length along x
    pub fn lx(&self) -> f64 {
        self.lx
    }

    /// Domain length along y
    pub fn ly(&self) -> f64 {
        self.ly
    }

    /// Grid spacing along x
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Grid spacing along y
    pub fn dy(&self) -> f64 {
        self.dy
    }

    /// Area of a single cell
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// Coordinates along x
    pub fn x(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.nx, |i| -self.lx / 2. + i as f64 * self.dx)
    }

    /// Coordinates along y
    pub fn y(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.ny, |j| -self.ly / 2. + j as f64 * self.dy)
    }

    /// 1-D periodic second difference operator along axis (0 = x, 1 = y)
    ///
    /// # Panics
    /// Axis larger than 1
    pub fn second_difference(&self, axis: usize) -> &SparseMatrix {
        match axis {
            0 => &self.dxx,
            1 => &self.dyy,
            _ => panic!("axis must be 0 or 1, got {}", axis),
        }
    }

    /// Sparse 5-point laplacian acting on flattened fields
    pub fn laplacian(&self) -> &SparseMatrix {
        &self.laplacian
    }

    /// True if both grids discretize the same domain
    pub fn same_domain(&self, other: &Self) -> bool {
        let tol = 1e-12 * self.lx.max(self.ly);
        (self.lx - other.lx).abs() <= tol && (self.ly - other.ly).abs() <= tol
    }
}
