//! Placement of several vortices in the domain
//!
//! Positions are relative to the domain center, the same frame as the grid
//! coordinates.
use super::InitialCondition;
use crate::error::{Result, VortError};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Attempts per vortex before random placement gives up
const MAX_ATTEMPTS: usize = 10_000;

/// How vortices are distributed in the domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "pattern")]
pub enum DispersionPattern {
    /// All vortices at the origin
    Single,
    /// Evenly spaced on a circle of radius min(lx, ly) / 4
    Circular,
    /// Rectangular lattice with ceil(sqrt(n)) columns
    Grid,
    /// Uniformly random with a minimum separation of max(lx, ly) / 10
    Random {
        /// Seed of the generator
        seed: u64,
    },
}

impl Default for DispersionPattern {
    fn default() -> Self {
        Self::Single
    }
}

impl DispersionPattern {
    /// Centers of `n` vortices in a `lx x ly` domain.
    ///
    /// # Errors
    /// Random placement could not satisfy the minimum separation.
    pub fn positions(&self, n: usize, lx: f64, ly: f64) -> Result<Vec<(f64, f64)>> {
        match *self {
            Self::Single => Ok(vec![(0., 0.); n]),
            Self::Circular => {
                let radius = lx.min(ly) / 4.;
                Ok((0..n)
                    .map(|k| {
                        let angle = 2. * PI * k as f64 / n as f64;
                        (radius * angle.cos(), radius * angle.sin())
                    })
                    .collect())
            }
            Self::Grid => {
                let cols = (n as f64).sqrt().ceil().max(1.) as usize;
                let rows = (n + cols - 1) / cols.max(1);
                let sx = lx / (cols + 1) as f64;
                let sy = ly / (rows + 1) as f64;
                Ok((0..n)
                    .map(|k| {
                        let (row, col) = (k / cols, k % cols);
                        (
                            (col + 1) as f64 * sx - lx / 2.,
                            (row + 1) as f64 * sy - ly / 2.,
                        )
                    })
                    .collect())
            }
            Self::Random { seed } => random_positions(n, lx, ly, seed),
        }
    }

    /// Replicate a point vortex at every position of the pattern. The
    /// superposition is normalized by the number of vortices.
    ///
    /// # Errors
    /// `base` has no center (e.g. Taylor-Green), `n == 0`, or placement failed.
    pub fn disperse(&self, base: &InitialCondition, n: usize, lx: f64, ly: f64) -> Result<InitialCondition> {
        if n == 0 {
            return Err(VortError::invalid("number of vortices must be positive"));
        }
        let members = self
            .positions(n, lx, ly)?
            .into_iter()
            .map(|(x, y)| {
                base.centered_at(x, y)
                    .ok_or_else(|| VortError::invalid(format!("{:?} cannot be dispersed", base)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(super::initial::MultiVortex {
            members,
            normalize: true,
        }
        .into())
    }
}

fn random_positions(n: usize, lx: f64, ly: f64, seed: u64) -> Result<Vec<(f64, f64)>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let min_dist = lx.max(ly) / 10.;
    let mut positions: Vec<(f64, f64)> = Vec::with_capacity(n);
    for _ in 0..n {
        let mut placed = false;
        for _ in 0..MAX_ATTEMPTS {
            let x = (rng.gen::<f64>() - 0.5) * lx;
            let y = (rng.gen::<f64>() - 0.5) * ly;
            if positions
                .iter()
                .all(|(px, py)| ((x - px).powi(2) + (y - py).powi(2)).sqrt() >= min_dist)
            {
                positions.push((x, y));
                placed = true;
                break;
            }
        }
        if !placed {
            return Err(VortError::invalid(format!(
                "could not place {} vortices with separation {}",
                n, min_dist
            )));
        }
    }
    Ok(positions)
}
