//! Cache of grids and factorized poisson operators.
//!
//! Building the laplacian and diagonalizing it is the expensive part of
//! setting up a run. The convergence search revisits grid sizes (e.g. the
//! reference of a comparison), so operators are kept per unique
//! `(nx, ny, lx, ly)` and handed out as shared read-only `Arc`s.
use super::GridSpec;
use crate::error::Result;
use crate::solver::PoissonSolver;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridKey {
    nx: usize,
    ny: usize,
    lx: u64,
    ly: u64,
}

impl GridKey {
    fn new(nx: usize, ny: usize, lx: f64, ly: f64) -> Self {
        Self {
            nx,
            ny,
            lx: lx.to_bits(),
            ly: ly.to_bits(),
        }
    }
}

/// Grid together with its factorized poisson operator
#[derive(Debug, Clone)]
pub struct Operators {
    /// Grid and laplacian
    pub grid: Arc<GridSpec>,
    /// Eigendecomposition based poisson solver
    pub poisson: Arc<PoissonSolver>,
}

/// Operator cache keyed by grid size and domain
#[derive(Debug, Default)]
pub struct OperatorCache {
    entries: HashMap<GridKey, Operators>,
}

impl OperatorCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached operators, or build and insert them.
    ///
    /// # Errors
    /// `InvalidGrid` or `SingularSystem`. Failed builds are not cached.
    pub fn get_or_build(&mut self, nx: usize, ny: usize, lx: f64, ly: f64) -> Result<Operators> {
        let key = GridKey::new(nx, ny, lx, ly);
        if let Some(ops) = self.entries.get(&key) {
            return Ok(ops.clone());
        }
        log::debug!("assemble operators for {}x{} grid", nx, ny);
        let grid = Arc::new(GridSpec::new(nx, ny, lx, ly)?);
        let poisson = Arc::new(PoissonSolver::new(&grid)?);
        let ops = Operators { grid, poisson };
        self.entries.insert(key, ops.clone());
        Ok(ops)
    }

    /// Number of cached grids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cache_reuses_operators() {
        let mut cache = OperatorCache::new();
        let a = cache.get_or_build(8, 8, 1., 1.).unwrap();
        let b = cache.get_or_build(8, 8, 1., 1.).unwrap();
        assert!(Arc::ptr_eq(&a.grid, &b.grid));
        assert!(Arc::ptr_eq(&a.poisson, &b.poisson));
        cache.get_or_build(8, 8, 2., 1.).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get_or_build(2, 8, 1., 1.).is_err());
        assert_eq!(cache.len(), 2);
    }
}
