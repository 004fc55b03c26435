//! # Two dimensional vorticity-streamfunction flow
//!
//! - [`jacobian`]: Arakawa discretization of the advection term
//! - [`stepper`]: RK3-SSP time stepping ([`FdStepper`])
//! - [`runner`]: full simulations with snapshots and diagnostics
//!   ([`SimulationRunner`])
pub mod functions;
pub mod jacobian;
pub mod runner;
pub mod stepper;
pub use runner::{GridParams, PhysicsParams, SimulationResult, SimulationRunner, Snapshot, TimeParams};
pub use stepper::FdStepper;
