//! # Simulation configuration
//!
//! Json configuration of a single run and of the convergence search.
//! Missing fields take their defaults, so
//! ```
//! use rustvort::config::SimulationConfig;
//! let config = SimulationConfig::from_json_str(r#"{ "n": 64 }"#).unwrap();
//! assert_eq!(config.n, 64);
//! assert_eq!(config.lx, 10.0);
//! ```
use crate::convergence::{GridSizePolicy, SearchSettings};
use crate::error::{Result, VortError};
use crate::field::{DispersionPattern, IcKind, InitialCondition};
use crate::grid::MIN_POINTS;
use crate::vorticity::{GridParams, PhysicsParams, TimeParams};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Named configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Single Lamb-Oseen vortex, N = 64, T = 1
    QuickTest,
    /// Four Lamb-Oseen vortices on a lattice, N = 128, T = 10
    Standard,
    /// Six Lamb-Oseen vortices on a circle, N = 256, T = 10
    HighResolution,
    /// Taylor-Green flow, N = 128, T = 1, dt = 1e-4
    ConvergenceStudy,
}

/// Initial condition of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcConfig {
    /// Profile
    pub kind: IcKind,
    /// Coefficients, see [`IcKind`]. Empty selects defaults.
    pub coefficients: Vec<f64>,
    /// Placement of several vortices
    pub pattern: DispersionPattern,
    /// Number of vortices (number of modes for Taylor-Green)
    pub n_vortices: usize,
}

impl Default for IcConfig {
    fn default() -> Self {
        Self {
            kind: IcKind::LambOseen,
            coefficients: vec![],
            pattern: DispersionPattern::Single,
            n_vortices: 1,
        }
    }
}

impl IcConfig {
    fn default_coefficients(&self) -> Vec<f64> {
        match self.kind {
            IcKind::GaussianBlob | IcKind::MultiVortex => vec![1.0, 2_f64.sqrt(), 0., 0.],
            IcKind::VortexPair => vec![1.0, 0.5, -1.0, 0., -1.0, 0.5, 1.0, 0.],
            IcKind::AnisotropicGaussian => vec![1.0, 1.0],
            IcKind::LambOseen => vec![1.0, 0.1, 1.0, 0., 0.],
            IcKind::Rankine => vec![1.0, 0.5, 0., 0.],
            IcKind::TaylorGreen => vec![1.0, self.n_vortices.max(1) as f64],
            IcKind::Random => vec![1.0, 0.],
        }
    }

    /// Build the initial condition on a `lx x ly` domain.
    ///
    /// Point vortices are replicated by the dispersion pattern if
    /// `n_vortices > 1`; other profiles are used as they are.
    ///
    /// # Errors
    /// Invalid coefficients, or the pattern could not place the vortices.
    pub fn initial_condition(&self, lx: f64, ly: f64) -> Result<InitialCondition> {
        let coefficients = if self.coefficients.is_empty() {
            self.default_coefficients()
        } else {
            self.coefficients.clone()
        };
        let base = InitialCondition::from_coefficients(self.kind, &coefficients)?;
        if self.n_vortices > 1 && base.centered_at(0., 0.).is_some() {
            return self.pattern.disperse(&base, self.n_vortices, lx, ly);
        }
        Ok(base)
    }
}

/// Settings of the convergence search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// First resolution of the initial pair
    pub n_initial: usize,
    /// Largest admissible resolution
    pub n_max: usize,
    /// Accepted discrepancy
    pub tolerance: f64,
    /// Rounding of predicted resolutions
    pub grid_policy: GridSizePolicy,
    /// Run `n_initial / 2` first. Without it `n_initial` has no coarser
    /// neighbour and the search brackets instead of predicting.
    pub seed_coarse: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_initial: 32,
            n_max: 512,
            tolerance: 1e-3,
            grid_policy: GridSizePolicy::Any,
            seed_coarse: true,
        }
    }
}

/// Complete configuration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Domain length in x
    pub lx: f64,
    /// Domain length in y
    pub ly: f64,
    /// Grid points per direction
    pub n: usize,
    /// Timestep size
    pub dt: f64,
    /// Final time
    pub t_final: f64,
    /// Kinematic viscosity
    pub nu: f64,
    /// Record a snapshot every that many steps
    pub snapshot_every: usize,
    /// Initial condition
    pub ic: IcConfig,
    /// Convergence search
    pub search: SearchConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            lx: 10.,
            ly: 10.,
            n: 128,
            dt: 1e-3,
            t_final: 10.,
            nu: 1e-4,
            snapshot_every: 100,
            ic: IcConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Configuration of a preset
    pub fn preset(preset: Preset) -> Self {
        let default = Self::default();
        match preset {
            Preset::QuickTest => Self {
                n: 64,
                t_final: 1.,
                ..default
            },
            Preset::Standard => Self {
                ic: IcConfig {
                    pattern: DispersionPattern::Grid,
                    n_vortices: 4,
                    ..IcConfig::default()
                },
                ..default
            },
            Preset::HighResolution => Self {
                n: 256,
                ic: IcConfig {
                    pattern: DispersionPattern::Circular,
                    n_vortices: 6,
                    ..IcConfig::default()
                },
                ..default
            },
            Preset::ConvergenceStudy => Self {
                t_final: 1.,
                dt: 1e-4,
                ic: IcConfig {
                    kind: IcKind::TaylorGreen,
                    ..IcConfig::default()
                },
                ..default
            },
        }
    }

    /// Parse and validate a json string
    ///
    /// # Errors
    /// Malformed json or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a json file
    ///
    /// # Errors
    /// File cannot be read, malformed json or invalid values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty printed json
    ///
    /// # Errors
    /// Serialization failed.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges of all values
    ///
    /// # Errors
    /// First value out of range.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0. {
                Ok(())
            } else {
                Err(VortError::invalid(format!("{} must be positive, got {}", name, v)))
            }
        };
        positive("lx", self.lx)?;
        positive("ly", self.ly)?;
        positive("dt", self.dt)?;
        positive("nu", self.nu)?;
        positive("tolerance", self.search.tolerance)?;
        if !(self.t_final.is_finite() && self.t_final >= 0.) {
            return Err(VortError::invalid(format!("t_final must be >= 0, got {}", self.t_final)));
        }
        if self.n < MIN_POINTS {
            return Err(VortError::invalid(format!("n must be at least {}, got {}", MIN_POINTS, self.n)));
        }
        if self.snapshot_every == 0 {
            return Err(VortError::invalid("snapshot_every must be at least 1"));
        }
        if self.ic.n_vortices == 0 {
            return Err(VortError::invalid("n_vortices must be at least 1"));
        }
        if self.search.n_initial < MIN_POINTS || self.search.n_max < self.search.n_initial {
            return Err(VortError::invalid(format!(
                "search range [{}, {}] is empty or too coarse",
                self.search.n_initial, self.search.n_max
            )));
        }
        Ok(())
    }

    /// Domain lengths `[lx, ly]`
    pub fn domain(&self) -> [f64; 2] {
        [self.lx, self.ly]
    }

    /// Grid of a single run
    pub fn grid_params(&self) -> GridParams {
        GridParams::square(self.n, self.lx, self.ly)
    }

    /// Viscosity
    pub fn physics_params(&self) -> PhysicsParams {
        PhysicsParams { nu: self.nu }
    }

    /// Time stepping
    pub fn time_params(&self) -> TimeParams {
        TimeParams {
            t_final: self.t_final,
            dt: self.dt,
            snapshot_every: self.snapshot_every,
        }
    }

    /// Initial condition on this domain
    ///
    /// # Errors
    /// See [`IcConfig::initial_condition`]
    pub fn initial_condition(&self) -> Result<InitialCondition> {
        self.ic.initial_condition(self.lx, self.ly)
    }

    /// Settings of the convergence search
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            policy: self.search.grid_policy,
            seed_coarse: self.search.seed_coarse,
            ..SearchSettings::new(self.search.n_initial, self.search.n_max, self.search.tolerance)
        }
    }
}
