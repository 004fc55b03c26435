//! # Grid convergence search
//!
//! Finds the coarsest n x n resolution whose final vorticity agrees with a
//! neighbouring resolution within a tolerance.
//!
//! - [`metric`]: discrepancy between two resolutions
//! - [`richardson`]: observed order and resolution prediction
//! - [`controller`]: the search state machine
//! - [`record`]: tested points and the iteration log
pub mod controller;
pub mod metric;
pub mod record;
pub mod richardson;
pub use controller::{
    bisect, find_converged_resolution, ConvergenceController, ConvergenceOutcome, ConvergenceState,
    FailureReason, FailureReport, ResolutionBackend, SearchSettings, SimulationBackend,
};
pub use metric::{compare_results, convergence_metric, Discrepancy};
pub use record::{ConvergencePoint, IterationRecord, MetricKind, Phase};
pub use richardson::{estimate_order, predict_resolution, GridSizePolicy, OrderEstimate, OrderValidity};
