//! Error types shared by the solver and the convergence search.
//!
//! All fallible operations return [`Result`]. Divergence of a single run
//! is absorbed by the [`crate::vorticity::SimulationRunner`] and reported as
//! `run_ok == false`; the remaining variants propagate to the caller.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate wide result type
pub type Result<T> = std::result::Result<T, VortError>;

/// Errors raised by grid construction, time stepping and the search
#[derive(Error, Debug)]
pub enum VortError {
    /// Grid dimensions or domain lengths are unusable
    #[error("invalid grid {nx}x{ny}: {reason}")]
    InvalidGrid {
        /// Points along x
        nx: usize,
        /// Points along y
        ny: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Vorticity became non-finite during a Runge-Kutta stage
    #[error("vorticity diverged in stage {stage} of step {step} (t = {time:.4e})")]
    Divergence {
        /// Index of the step that failed (1-based)
        step: usize,
        /// Simulation time at the start of the step
        time: f64,
        /// Runge-Kutta stage (1..=3)
        stage: usize,
    },

    /// Both fields of a comparison are numerically zero
    #[error("cannot compare fields with peak vorticity {peak_coarse:.3e} and {peak_fine:.3e}")]
    DegenerateComparison {
        /// Peak of the coarse field
        peak_coarse: f64,
        /// Peak of the fine field
        peak_fine: f64,
    },

    /// The Poisson operator could not be factorized
    #[error("singular poisson system: {0}")]
    SingularSystem(String),

    /// Search was cancelled between two resolution tests
    #[error("search cancelled by user")]
    UserCancelled,

    /// A parameter is out of its admissible range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A field handed to a diagnostic contains NaN or infinity
    #[error("non-finite values in {0}")]
    NonFinite(String),

    /// Reading a configuration file failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration is not valid json
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Tag of a [`VortError`] without payload, stored in results and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`VortError::InvalidGrid`]
    InvalidGrid,
    /// See [`VortError::Divergence`]
    Divergence,
    /// See [`VortError::DegenerateComparison`]
    DegenerateComparison,
    /// See [`VortError::SingularSystem`]
    SingularSystem,
    /// See [`VortError::UserCancelled`]
    UserCancelled,
    /// See [`VortError::InvalidParameter`]
    InvalidParameter,
    /// See [`VortError::NonFinite`]
    NonFinite,
    /// Io or json failures
    Config,
}

impl VortError {
    /// Payload free tag of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGrid { .. } => ErrorKind::InvalidGrid,
            Self::Divergence { .. } => ErrorKind::Divergence,
            Self::DegenerateComparison { .. } => ErrorKind::DegenerateComparison,
            Self::SingularSystem(_) => ErrorKind::SingularSystem,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::NonFinite(_) => ErrorKind::NonFinite,
            Self::Io(_) | Self::Json(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = VortError::Divergence {
            step: 3,
            time: 0.2,
            stage: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Divergence);
        assert!(err.to_string().contains("stage 2 of step 3"));
        assert_eq!(VortError::invalid("dt").kind(), ErrorKind::InvalidParameter);
    }
}
