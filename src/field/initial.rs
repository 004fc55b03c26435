//! Initial vorticity distributions
//!
//! Each profile implements [`VorticityProfile`], the closed set of profiles
//! is collected in [`InitialCondition`] (dispatched with `enum_dispatch`).
//!
//! Profiles can also be built from a kind tag and a flat coefficient vector,
//! see [`InitialCondition::from_coefficients`]. Layouts:
//!
//! | kind | coefficients |
//! |---|---|
//! | `gaussian_blob` | `[gamma, radius, x0, y0]` |
//! | `vortex_pair` | `[gamma1, radius1, x1, y1, gamma2, radius2, x2, y2]` |
//! | `multi_vortex` | `k` blobs, `[gamma, radius, x0, y0] * k` |
//! | `anisotropic_gaussian` | `[x_coeff, y_coeff]` |
//! | `lamb_oseen` | `[gamma, nu, t0, x0, y0]` |
//! | `rankine` | `[omega0, core_radius, x0, y0]` |
//! | `taylor_green` | `[k, n_modes]` |
//! | `random` | `[amplitude, seed]` |
use crate::error::{Result, VortError};
use crate::grid::GridSpec;
use ndarray::{Array2, Zip};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Vorticity distribution that can be sampled on a grid
#[enum_dispatch]
pub trait VorticityProfile {
    /// Overwrite `omega` with the profile sampled on `grid`
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>);
}

/// Evaluate f(x, y) at every grid point
fn fill_pointwise<F: Fn(f64, f64) -> f64>(grid: &GridSpec, omega: &mut Array2<f64>, f: F) {
    let x = grid.x();
    let y = grid.y();
    Zip::indexed(omega).for_each(|(i, j), w| *w = f(x[i], y[j]));
}

/// Gaussian vortex with circulation `gamma`,
/// omega = gamma / (pi r^2) exp(-|x - x0|^2 / r^2)
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBlob {
    /// Circulation
    pub gamma: f64,
    /// Core radius
    pub radius: f64,
    /// Center x
    pub x0: f64,
    /// Center y
    pub y0: f64,
}

impl GaussianBlob {
    /// Construct blob.
    ///
    /// # Errors
    /// Non-positive radius or non-finite values.
    pub fn new(gamma: f64, radius: f64, x0: f64, y0: f64) -> Result<Self> {
        check_finite(&[gamma, radius, x0, y0])?;
        if radius <= 0. {
            return Err(VortError::invalid(format!("blob radius must be positive, got {}", radius)));
        }
        Ok(Self {
            gamma,
            radius,
            x0,
            y0,
        })
    }

    fn value(&self, x: f64, y: f64) -> f64 {
        let r2 = (x - self.x0).powi(2) + (y - self.y0).powi(2);
        self.gamma / (PI * self.radius.powi(2)) * (-r2 / self.radius.powi(2)).exp()
    }
}

impl VorticityProfile for GaussianBlob {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        fill_pointwise(grid, omega, |x, y| self.value(x, y));
    }
}

/// Two gaussian blobs
#[derive(Debug, Clone, PartialEq)]
pub struct VortexPair {
    /// First vortex
    pub first: GaussianBlob,
    /// Second vortex
    pub second: GaussianBlob,
}

impl VorticityProfile for VortexPair {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        fill_pointwise(grid, omega, |x, y| self.first.value(x, y) + self.second.value(x, y));
    }
}

/// Superposition of several profiles
#[derive(Debug, Clone)]
pub struct MultiVortex {
    /// Superposed profiles
    pub members: Vec<InitialCondition>,
    /// Divide the sum by the number of members
    pub normalize: bool,
}

impl VorticityProfile for MultiVortex {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        omega.fill(0.);
        let mut buf = Array2::zeros(omega.raw_dim());
        for member in &self.members {
            member.fill(grid, &mut buf);
            *omega += &buf;
        }
        if self.normalize && !self.members.is_empty() {
            *omega /= self.members.len() as f64;
        }
    }
}

/// Stretched gaussian centered in the domain, omega = exp(-(a x^2 + b y^2))
#[derive(Debug, Clone, PartialEq)]
pub struct AnisotropicGaussian {
    /// Coefficient a
    pub x_coeff: f64,
    /// Coefficient b
    pub y_coeff: f64,
}

impl VorticityProfile for AnisotropicGaussian {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        fill_pointwise(grid, omega, |x, y| {
            (-(self.x_coeff * x * x + self.y_coeff * y * y)).exp()
        });
    }
}

/// Lamb-Oseen vortex at time t0,
/// omega = gamma / (4 pi nu t0) exp(-r^2 / (4 nu t0))
#[derive(Debug, Clone, PartialEq)]
pub struct LambOseen {
    /// Circulation
    pub gamma: f64,
    /// Viscosity used for the core size
    pub nu: f64,
    /// Age of the vortex
    pub t0: f64,
    /// Center x
    pub x0: f64,
    /// Center y
    pub y0: f64,
}

impl VorticityProfile for LambOseen {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        let core = 4. * self.nu * self.t0;
        fill_pointwise(grid, omega, |x, y| {
            let r2 = (x - self.x0).powi(2) + (y - self.y0).powi(2);
            self.gamma / (PI * core) * (-r2 / core).exp()
        });
    }
}

/// Rankine vortex, constant vorticity inside the core
#[derive(Debug, Clone, PartialEq)]
pub struct Rankine {
    /// Core vorticity
    pub omega0: f64,
    /// Core radius
    pub core_radius: f64,
    /// Center x
    pub x0: f64,
    /// Center y
    pub y0: f64,
}

impl VorticityProfile for Rankine {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        let rc2 = self.core_radius.powi(2);
        fill_pointwise(grid, omega, |x, y| {
            let r2 = (x - self.x0).powi(2) + (y - self.y0).powi(2);
            if r2 <= rc2 {
                self.omega0
            } else {
                0.
            }
        });
    }
}

/// Taylor-Green cells, sum over m = 1..=n of 2 k_m sin(k_m x) sin(k_m y) / n
/// with k_m = m k
#[derive(Debug, Clone, PartialEq)]
pub struct TaylorGreen {
    /// Base wavenumber
    pub k: f64,
    /// Number of harmonics
    pub n_modes: usize,
}

impl VorticityProfile for TaylorGreen {
    fn fill(&self, grid: &GridSpec, omega: &mut Array2<f64>) {
        let n = self.n_modes.max(1);
        fill_pointwise(grid, omega, |x, y| {
            (1..=n)
                .map(|m| {
                    let km = m as f64 * self.k;
                    2. * km * (km * x).sin() * (km * y).sin()
                })
                .sum::<f64>()
                / n as f64
        });
    }
}

/// Uniform noise in [-amplitude, amplitude], reproducible by seed
#[derive(Debug, Clone, PartialEq)]
pub struct RandomField {
    amplitude: f64,
    seed: u64,
}

impl RandomField {
    /// Construct noise field.
    ///
    /// # Errors
    /// Amplitude not positive.
    pub fn new(amplitude: f64, seed: u64) -> Result<Self> {
        if !(amplitude.is_finite() && amplitude > 0.) {
            return Err(VortError::invalid(format!(
                "random amplitude must be positive, got {}",
                amplitude
            )));
        }
        Ok(Self { amplitude, seed })
    }
}

impl VorticityProfile for RandomField {
    fn fill(&self, _grid: &GridSpec, omega: &mut Array2<f64>) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Array2::random_using(
            omega.raw_dim(),
            Uniform::new(-self.amplitude, self.amplitude),
            &mut rng,
        );
        omega.assign(&noise);
    }
}

/// Closed set of initial conditions
#[enum_dispatch(VorticityProfile)]
#[derive(Debug, Clone)]
pub enum InitialCondition {
    /// Single gaussian vortex
    GaussianBlob,
    /// Two gaussian vortices
    VortexPair,
    /// Superposition
    MultiVortex,
    /// Stretched gaussian
    AnisotropicGaussian,
    /// Lamb-Oseen vortex
    LambOseen,
    /// Rankine vortex
    Rankine,
    /// Taylor-Green cells
    TaylorGreen,
    /// Uniform noise
    RandomField,
}

/// Kind tag of an [`InitialCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcKind {
    /// `[gamma, radius, x0, y0]`
    GaussianBlob,
    /// `[gamma1, radius1, x1, y1, gamma2, radius2, x2, y2]`
    VortexPair,
    /// `[gamma, radius, x0, y0] * k`
    MultiVortex,
    /// `[x_coeff, y_coeff]`
    AnisotropicGaussian,
    /// `[gamma, nu, t0, x0, y0]`
    LambOseen,
    /// `[omega0, core_radius, x0, y0]`
    Rankine,
    /// `[k, n_modes]`
    TaylorGreen,
    /// `[amplitude, seed]`
    Random,
}

fn check_finite(values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(VortError::invalid(format!("non-finite coefficient in {:?}", values)))
    }
}

fn check_len(kind: IcKind, coeffs: &[f64], expected: usize) -> Result<()> {
    if coeffs.len() == expected {
        Ok(())
    } else {
        Err(VortError::invalid(format!(
            "{:?} expects {} coefficients, got {}",
            kind,
            expected,
            coeffs.len()
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value > 0. {
        Ok(value)
    } else {
        Err(VortError::invalid(format!("{} must be positive, got {}", name, value)))
    }
}

impl InitialCondition {
    /// Build an initial condition from a kind tag and coefficient vector.
    ///
    /// # Errors
    /// Wrong number of coefficients, non-finite values or values out of range.
    ///
    /// # Example
    /// ```
    /// use rustvort::field::{IcKind, InitialCondition};
    /// let ic = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, 0.5, 0.0, 0.0]);
    /// assert!(ic.is_ok());
    /// assert!(InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0]).is_err());
    /// ```
    pub fn from_coefficients(kind: IcKind, coeffs: &[f64]) -> Result<Self> {
        check_finite(coeffs)?;
        let ic = match kind {
            IcKind::GaussianBlob => {
                check_len(kind, coeffs, 4)?;
                GaussianBlob::new(coeffs[0], coeffs[1], coeffs[2], coeffs[3])?.into()
            }
            IcKind::VortexPair => {
                check_len(kind, coeffs, 8)?;
                VortexPair {
                    first: GaussianBlob::new(coeffs[0], coeffs[1], coeffs[2], coeffs[3])?,
                    second: GaussianBlob::new(coeffs[4], coeffs[5], coeffs[6], coeffs[7])?,
                }
                .into()
            }
            IcKind::MultiVortex => {
                if coeffs.is_empty() || coeffs.len() % 4 != 0 {
                    return Err(VortError::invalid(format!(
                        "multi vortex expects a multiple of 4 coefficients, got {}",
                        coeffs.len()
                    )));
                }
                let members = coeffs
                    .chunks(4)
                    .map(|c| GaussianBlob::new(c[0], c[1], c[2], c[3]).map(Self::from))
                    .collect::<Result<Vec<_>>>()?;
                MultiVortex {
                    members,
                    normalize: false,
                }
                .into()
            }
            IcKind::AnisotropicGaussian => {
                check_len(kind, coeffs, 2)?;
                AnisotropicGaussian {
                    x_coeff: positive("x_coeff", coeffs[0])?,
                    y_coeff: positive("y_coeff", coeffs[1])?,
                }
                .into()
            }
            IcKind::LambOseen => {
                check_len(kind, coeffs, 5)?;
                LambOseen {
                    gamma: coeffs[0],
                    nu: positive("nu", coeffs[1])?,
                    t0: positive("t0", coeffs[2])?,
                    x0: coeffs[3],
                    y0: coeffs[4],
                }
                .into()
            }
            IcKind::Rankine => {
                check_len(kind, coeffs, 4)?;
                Rankine {
                    omega0: coeffs[0],
                    core_radius: positive("core_radius", coeffs[1])?,
                    x0: coeffs[2],
                    y0: coeffs[3],
                }
                .into()
            }
            IcKind::TaylorGreen => {
                check_len(kind, coeffs, 2)?;
                let n_modes = coeffs[1]
                    .to_usize()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| VortError::invalid(format!("n_modes must be >= 1, got {}", coeffs[1])))?;
                TaylorGreen {
                    k: positive("k", coeffs[0])?,
                    n_modes,
                }
                .into()
            }
            IcKind::Random => {
                check_len(kind, coeffs, 2)?;
                let seed = coeffs[1]
                    .to_u64()
                    .ok_or_else(|| VortError::invalid(format!("seed must be non-negative, got {}", coeffs[1])))?;
                RandomField::new(coeffs[0], seed)?.into()
            }
        };
        Ok(ic)
    }

    /// Copy of a point vortex moved to (x0, y0). `None` for profiles
    /// without a center.
    pub fn centered_at(&self, x0: f64, y0: f64) -> Option<Self> {
        match self {
            Self::GaussianBlob(b) => Some(
                GaussianBlob {
                    x0,
                    y0,
                    ..b.clone()
                }
                .into(),
            ),
            Self::LambOseen(v) => Some(LambOseen { x0, y0, ..v.clone() }.into()),
            Self::Rankine(v) => Some(Rankine { x0, y0, ..v.clone() }.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new(65, 65, 8.0, 8.0).unwrap()
    }

    #[test]
    fn test_gaussian_blob_circulation() {
        let grid = grid();
        let ic = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[2.0, 0.5, 0.5, -1.0]).unwrap();
        let mut omega = Array2::zeros(grid.shape());
        ic.fill(&grid, &mut omega);
        let circulation = omega.sum() * grid.cell_area();
        assert!((circulation - 2.0).abs() < 1e-6);
        // maximum at the center
        let peak = omega.iter().fold(0_f64, |a, b| a.max(*b));
        let center = omega[[36, 24]];
        assert!((peak - center).abs() < 1e-12);
    }

    #[test]
    fn test_vortex_pair_antisymmetric() {
        let grid = grid();
        let ic = InitialCondition::from_coefficients(
            IcKind::VortexPair,
            &[1.0, 0.4, -1.0, 0.0, -1.0, 0.4, 1.0, 0.0],
        )
        .unwrap();
        let mut omega = Array2::zeros(grid.shape());
        ic.fill(&grid, &mut omega);
        assert!(omega.sum().abs() < 1e-10);
        assert!((omega[[24, 32]] + omega[[40, 32]]).abs() < 1e-12);
    }

    #[test]
    fn test_multi_vortex_sums_members() {
        let grid = grid();
        let single = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, 0.5, 0.0, 0.0]).unwrap();
        let multi = InitialCondition::from_coefficients(
            IcKind::MultiVortex,
            &[1.0, 0.5, 0.0, 0.0, 1.0, 0.5, 0.0, 0.0],
        )
        .unwrap();
        let mut a = Array2::zeros(grid.shape());
        let mut b = Array2::zeros(grid.shape());
        single.fill(&grid, &mut a);
        multi.fill(&grid, &mut b);
        assert!((b[[32, 32]] - 2. * a[[32, 32]]).abs() < 1e-12);
    }

    #[test]
    fn test_anisotropic() {
        let grid = grid();
        let ic = InitialCondition::from_coefficients(IcKind::AnisotropicGaussian, &[1.0, 4.0]).unwrap();
        let mut omega = Array2::zeros(grid.shape());
        ic.fill(&grid, &mut omega);
        assert!((omega[[32, 32]] - 1.0).abs() < 1e-12);
        // decays faster along y
        assert!(omega[[40, 32]] > omega[[32, 40]]);
    }

    #[test]
    fn test_rankine_and_lamb_oseen() {
        let grid = grid();
        let rankine = InitialCondition::from_coefficients(IcKind::Rankine, &[3.0, 1.0, 0.0, 0.0]).unwrap();
        let mut omega = Array2::zeros(grid.shape());
        rankine.fill(&grid, &mut omega);
        assert_eq!(omega[[32, 32]], 3.0);
        assert_eq!(omega[[0, 0]], 0.0);

        let lamb = InitialCondition::from_coefficients(IcKind::LambOseen, &[1.0, 0.01, 10.0, 0.0, 0.0]).unwrap();
        lamb.fill(&grid, &mut omega);
        assert!((omega[[32, 32]] - 1. / (PI * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_taylor_green_zero_mean() {
        let grid = GridSpec::new(33, 33, 2. * PI, 2. * PI).unwrap();
        let ic = InitialCondition::from_coefficients(IcKind::TaylorGreen, &[1.0, 2.0]).unwrap();
        let mut omega = Array2::zeros(grid.shape());
        ic.fill(&grid, &mut omega);
        assert!(omega.sum().abs() < 1e-10);
    }

    #[test]
    fn test_random_reproducible() {
        let grid = GridSpec::new(8, 8, 1.0, 1.0).unwrap();
        let ic = InitialCondition::from_coefficients(IcKind::Random, &[0.5, 7.0]).unwrap();
        let mut a = Array2::zeros(grid.shape());
        let mut b = Array2::zeros(grid.shape());
        ic.fill(&grid, &mut a);
        ic.fill(&grid, &mut b);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() <= 0.5));
    }

    #[test]
    fn test_invalid_coefficients() {
        assert!(InitialCondition::from_coefficients(IcKind::VortexPair, &[1.0; 7]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::MultiVortex, &[1.0; 6]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, -0.5, 0., 0.]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::Random, &[0.0, 1.0]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::Random, &[1.0, -1.0]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::TaylorGreen, &[1.0, 0.0]).is_err());
        assert!(InitialCondition::from_coefficients(IcKind::Rankine, &[1.0, f64::NAN, 0., 0.]).is_err());
    }

    #[test]
    fn test_centered_at() {
        let ic = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, 0.5, 0.0, 0.0]).unwrap();
        match ic.centered_at(1.0, 2.0) {
            Some(InitialCondition::GaussianBlob(b)) => {
                assert_eq!((b.x0, b.y0, b.gamma), (1.0, 2.0, 1.0));
            }
            _ => panic!("expected moved blob"),
        }
        let tg = InitialCondition::from_coefficients(IcKind::TaylorGreen, &[1.0, 1.0]).unwrap();
        assert!(tg.centered_at(0., 0.).is_none());
    }
}
