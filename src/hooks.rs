//! Hooks for collaborators of the convergence search
//!
//! Observers are injected into the [`crate::convergence::ConvergenceController`];
//! the search works without any of them.
use crate::convergence::{ConvergencePoint, Phase};
use crate::field::VorticityField;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress of the search
pub trait ConvergenceObserver {
    /// Called once per executed resolution, after its metric is known
    fn on_resolution_tested(&mut self, _point: &ConvergencePoint) {}

    /// Called for every snapshot recorded by any run
    fn on_snapshot(&mut self, _field: &VorticityField, _time: f64) {}

    /// Called when the search enters a new phase
    fn on_phase_change(&mut self, _phase: Phase) {}
}

/// Error type of energy monitors
pub type MonitorError = Box<dyn std::error::Error + Send + Sync>;

/// Measures energy consumption around each resolution test.
///
/// Failures are logged by the controller and otherwise ignored.
pub trait EnergyMonitor {
    /// Start measuring before the run at resolution n
    ///
    /// # Errors
    /// Measurement could not be started
    fn start(&mut self, n: usize) -> Result<(), MonitorError>;

    /// Stop measuring after the run at resolution n
    ///
    /// # Errors
    /// Measurement could not be stopped
    fn stop(&mut self, n: usize) -> Result<(), MonitorError>;
}

/// Cooperative cancellation flag, checked between resolution tests.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancel was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer writing every tested resolution to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ConvergenceObserver for LogObserver {
    fn on_resolution_tested(&mut self, point: &ConvergencePoint) {
        log::info!(
            "N = {:5}  metric = {:10.4e} ({:?})  wall time = {:.2}s",
            point.n,
            point.metric_value,
            point.metric_kind,
            point.wall_time
        );
    }
}
