//! Adaptive search for the coarsest converged resolution
//!
//! The search is a state machine over [`Phase`]:
//!
//! 1. `InitialPair`: run a coarse seed `n1 / 2`, then `n1` and `n2 = 2 n1`.
//!    Diverging runs shift the pair upwards, `(n1, n2) -> (n2, 2 n2)`.
//! 2. `RichardsonPredict`: estimate the order from the pair, run the
//!    predicted resolution, and predict once more if it misses.
//! 3. `Bracketing`: double from the largest failing resolution until one
//!    passes.
//! 4. `BinaryRefine`: bisect between a failing and a passing resolution.
//!
//! The metric of a tested resolution is its discrepancy to the nearest
//! coarser resolution that ran successfully (or the nearest finer one). A
//! resolution passes if its metric is at most the tolerance. The first
//! successful run has nothing to compare with and is logged as baseline.
//!
//! Bisection uses a single fixed reference instead: the finest successful
//! run, after running `2 n_high` (within `n_max`) if nothing finer than the
//! bracket exists. The bracket is realigned so that its lower end
//! disagrees with that reference and its upper end agrees.
//!
//! Each solver invocation adds exactly one [`ConvergencePoint`] and one
//! [`IterationRecord`]; no resolution is run twice.
use super::metric::convergence_metric;
use super::record::{ConvergencePoint, IterationRecord, MetricKind, Phase};
use super::richardson::{estimate_order, predict_resolution, GridSizePolicy};
use crate::error::{Result, VortError};
use crate::field::{InitialCondition, VorticityField};
use crate::grid::MIN_POINTS;
use crate::hooks::{CancelToken, ConvergenceObserver, EnergyMonitor};
use crate::vorticity::{GridParams, PhysicsParams, SimulationResult, SimulationRunner, TimeParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Produces a simulation result at n x n resolution
pub trait ResolutionBackend {
    /// Run at resolution n, reporting snapshots to `on_snapshot`.
    ///
    /// # Errors
    /// Fatal errors (invalid grid, singular system). Divergence is
    /// reported with `run_ok == false`.
    fn run(&mut self, n: usize, on_snapshot: &mut dyn FnMut(&VorticityField, f64)) -> Result<SimulationResult>;
}

/// Backend running the finite difference solver on a fixed problem
#[derive(Debug)]
pub struct SimulationBackend {
    runner: SimulationRunner,
    domain: [f64; 2],
    physics: PhysicsParams,
    ic: InitialCondition,
    time: TimeParams,
}

impl SimulationBackend {
    /// Problem on a `domain[0] x domain[1]` periodic box
    pub fn new(domain: [f64; 2], physics: PhysicsParams, ic: InitialCondition, time: TimeParams) -> Self {
        Self {
            runner: SimulationRunner::new(),
            domain,
            physics,
            ic,
            time,
        }
    }
}

impl ResolutionBackend for SimulationBackend {
    fn run(&mut self, n: usize, on_snapshot: &mut dyn FnMut(&VorticityField, f64)) -> Result<SimulationResult> {
        let grid = GridParams::square(n, self.domain[0], self.domain[1]);
        self.runner
            .run_observed(&grid, &self.physics, &self.ic, &self.time, on_snapshot)
    }
}

/// Parameters of the search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// First resolution of the initial pair
    pub n_initial: usize,
    /// Largest resolution that may be run
    pub n_max: usize,
    /// Accepted discrepancy
    pub tolerance: f64,
    /// Rounding of predicted resolutions
    pub policy: GridSizePolicy,
    /// Run n_initial / 2 as coarser neighbour of n_initial. Without it
    /// n_initial is a baseline, no order can be observed and the search
    /// brackets instead of predicting.
    pub seed_coarse: bool,
}

impl SearchSettings {
    /// Settings with default rounding and a coarse seed
    pub fn new(n_initial: usize, n_max: usize, tolerance: f64) -> Self {
        Self {
            n_initial,
            n_max,
            tolerance,
            policy: GridSizePolicy::Any,
            seed_coarse: true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_initial < MIN_POINTS {
            return Err(VortError::invalid(format!(
                "n_initial must be at least {}, got {}",
                MIN_POINTS, self.n_initial
            )));
        }
        if self.n_max < self.n_initial {
            return Err(VortError::invalid(format!(
                "n_max ({}) is smaller than n_initial ({})",
                self.n_max, self.n_initial
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.) {
            return Err(VortError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Why a search ended without result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The last run diverged
    Divergence,
    /// n_max reached without meeting the tolerance
    ExhaustedBudget,
    /// Cancelled through the [`CancelToken`]
    UserCancelled,
}

/// Summary of a failed search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Why the search stopped
    pub reason: FailureReason,
    /// Largest failing resolution that was run
    pub n_low: Option<usize>,
    /// Last passing resolution
    pub n_high: Option<usize>,
    /// Smallest tested resolution that met the tolerance
    pub best_n: Option<usize>,
}

/// Observable state of the search
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceState {
    /// Current phase
    pub phase: Phase,
    /// Executed resolutions in order
    pub tested_points: Vec<ConvergencePoint>,
    /// Failing end of the bracket
    pub n_low: Option<usize>,
    /// Passing end of the bracket
    pub n_high: Option<usize>,
    /// Accepted discrepancy
    pub tolerance: f64,
    /// Largest admissible resolution
    pub max_n: usize,
    /// Latest observed order of convergence
    pub convergence_order_estimate: Option<f64>,
}

/// Result of [`ConvergenceController::run`]
#[derive(Debug, Clone)]
pub struct ConvergenceOutcome {
    /// Minimal resolution meeting the tolerance
    pub n_star: Option<usize>,
    /// True if n_star was found
    pub converged: bool,
    /// One record per solver invocation
    pub iteration_log: Vec<IterationRecord>,
    /// One point per solver invocation
    pub tested_points: Vec<ConvergencePoint>,
    /// Set if the search failed
    pub failure: Option<FailureReport>,
    /// Latest observed order of convergence
    pub order_estimate: Option<f64>,
}

/// Bisect `(low, high]` for the smallest value where `passes` holds,
/// assuming `passes(high)` and not `passes(low)`. Returns the final
/// bracket `(low, high)` with `high - low <= 1` and the number of
/// evaluations, at most `ceil(log2(high - low))`.
///
/// # Errors
/// `low >= high`, or the first error of `passes`.
///
/// # Example
/// ```
/// use rustvort::convergence::bisect;
/// let (low, high, evals) = bisect(10, 100, |n| Ok(n >= 37)).unwrap();
/// assert_eq!((low, high), (36, 37));
/// assert!(evals <= 7);
/// ```
pub fn bisect<F>(mut low: usize, mut high: usize, mut passes: F) -> Result<(usize, usize, usize)>
where
    F: FnMut(usize) -> Result<bool>,
{
    if low >= high {
        return Err(VortError::invalid(format!("empty bracket ({}, {})", low, high)));
    }
    let mut evaluations = 0;
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if passes(mid)? {
            high = mid;
        } else {
            low = mid;
        }
        evaluations += 1;
    }
    Ok((low, high, evaluations))
}

/// Executed resolution: metric and final field (`None` if diverged)
#[derive(Debug)]
struct Tested {
    metric: f64,
    field: Option<VorticityField>,
}

/// Drives the search, see module documentation
pub struct ConvergenceController<B> {
    backend: B,
    settings: SearchSettings,
    state: ConvergenceState,
    tested: BTreeMap<usize, Tested>,
    log: Vec<IterationRecord>,
    cumulative_time: f64,
    pair: (usize, usize),
    anchor: Option<usize>,
    last_diverged: bool,
    n_star: Option<usize>,
    failure: Option<FailureReason>,
    observer: Option<Box<dyn ConvergenceObserver>>,
    monitor: Option<Box<dyn EnergyMonitor>>,
    cancel: CancelToken,
}

impl<B: ResolutionBackend> ConvergenceController<B> {
    /// New search in phase `InitialPair`.
    ///
    /// # Errors
    /// `n_initial < 4`, `n_max < n_initial` or non-positive tolerance.
    pub fn new(backend: B, settings: SearchSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            backend,
            settings,
            state: ConvergenceState {
                phase: Phase::InitialPair,
                tested_points: vec![],
                n_low: None,
                n_high: None,
                tolerance: settings.tolerance,
                max_n: settings.n_max,
                convergence_order_estimate: None,
            },
            tested: BTreeMap::new(),
            log: vec![],
            cumulative_time: 0.,
            pair: (settings.n_initial, settings.n_initial),
            anchor: None,
            last_diverged: false,
            n_star: None,
            failure: None,
            observer: None,
            monitor: None,
            cancel: CancelToken::new(),
        })
    }

    /// Attach progress observer
    pub fn with_observer(mut self, observer: Box<dyn ConvergenceObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach energy monitor
    pub fn with_energy_monitor(mut self, monitor: Box<dyn EnergyMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Use an externally controlled cancellation token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current state
    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// Run the search to completion.
    ///
    /// # Errors
    /// Fatal solver errors (`InvalidGrid`, `SingularSystem`) and
    /// `DegenerateComparison`. Divergence, exhausted budget and
    /// cancellation end in a failed outcome instead.
    pub fn run(mut self) -> Result<ConvergenceOutcome> {
        log::info!(
            "search resolution in [{}, {}] with tolerance {:.3e}",
            self.settings.n_initial,
            self.settings.n_max,
            self.settings.tolerance
        );
        while !self.state.phase.is_terminal() {
            let next = match self.state.phase {
                Phase::InitialPair => self.initial_pair(),
                Phase::RichardsonPredict => self.richardson_predict(),
                Phase::Bracketing => self.bracketing(),
                Phase::BinaryRefine => self.binary_refine(),
                Phase::Converged | Phase::Failed => Ok(self.state.phase),
            };
            let phase = match next {
                Ok(phase) => phase,
                Err(VortError::UserCancelled) => {
                    log::warn!("search cancelled after {} runs", self.log.len());
                    self.fail(FailureReason::UserCancelled)
                }
                Err(err) => return Err(err),
            };
            if phase != self.state.phase {
                log::debug!("{} -> {}", self.state.phase.name(), phase.name());
                if let Some(o) = self.observer.as_mut() {
                    o.on_phase_change(phase);
                }
            }
            self.state.phase = phase;
        }
        Ok(self.outcome())
    }

    fn outcome(self) -> ConvergenceOutcome {
        let converged = self.state.phase == Phase::Converged;
        let failure = self.failure.map(|reason| FailureReport {
            reason,
            n_low: self.state.n_low,
            n_high: self.state.n_high,
            best_n: self.best_passing(),
        });
        match (converged, &failure) {
            (true, _) => log::info!(
                "converged at N = {:?} after {} runs ({:.2}s)",
                self.n_star,
                self.log.len(),
                self.cumulative_time
            ),
            (false, Some(f)) => log::warn!("search failed: {:?}", f),
            (false, None) => {}
        }
        ConvergenceOutcome {
            n_star: if converged { self.n_star } else { None },
            converged,
            iteration_log: self.log,
            tested_points: self.state.tested_points,
            failure,
            order_estimate: self.state.convergence_order_estimate,
        }
    }

    fn passes(&self, metric: f64) -> bool {
        metric <= self.settings.tolerance
    }

    fn metric_of(&self, n: usize) -> f64 {
        self.tested.get(&n).map_or(f64::INFINITY, |t| t.metric)
    }

    fn diverged(&self, n: usize) -> bool {
        self.tested.get(&n).map_or(false, |t| t.field.is_none())
    }

    fn best_passing(&self) -> Option<usize> {
        self.tested
            .iter()
            .find(|(_, t)| self.passes(t.metric))
            .map(|(n, _)| *n)
    }

    fn fail(&mut self, reason: FailureReason) -> Phase {
        self.failure = Some(reason);
        Phase::Failed
    }

    fn fail_exhausted(&mut self, n_low: usize) -> Phase {
        debug_assert!(self.tested.contains_key(&n_low));
        self.state.n_low = Some(n_low);
        let reason = if self.last_diverged {
            FailureReason::Divergence
        } else {
            FailureReason::ExhaustedBudget
        };
        self.fail(reason)
    }

    fn enter_refine(&mut self, n_low: usize, n_high: usize) -> Phase {
        debug_assert!(n_low < n_high);
        self.state.n_low = Some(n_low);
        self.state.n_high = Some(n_high);
        Phase::BinaryRefine
    }

    /// Bisect below a passing `n`, or accept it if nothing coarser ran
    fn refine_below(&mut self, n: usize) -> Phase {
        match self.tested.range(..n).next_back().map(|(k, _)| *k) {
            Some(low) => self.enter_refine(low, n),
            None => {
                self.n_star = Some(n);
                Phase::Converged
            }
        }
    }

    fn record_order(&mut self, order: f64) {
        if order.is_finite() {
            self.state.convergence_order_estimate = Some(order);
        }
    }

    /// Resolution the metric of `n` is computed against
    fn reference_for(&self, n: usize) -> Option<usize> {
        let ran = |t: &&Tested| t.field.is_some();
        if let Some(anchor) = self.anchor {
            if anchor != n && self.tested.get(&anchor).map_or(false, |t| ran(&t)) {
                return Some(anchor);
            }
        }
        self.tested
            .range(..n)
            .rev()
            .find(|(_, t)| ran(t))
            .or_else(|| self.tested.range(n + 1..).find(|(_, t)| ran(t)))
            .map(|(k, _)| *k)
    }

    /// Discrepancy between `field` at resolution n and the reference
    fn discrepancy(&self, n: usize, field: &VorticityField) -> Result<(f64, MetricKind, Option<usize>)> {
        let reference = match self.reference_for(n) {
            Some(r) => r,
            None => return Ok((f64::INFINITY, MetricKind::Baseline, None)),
        };
        let reference_field = match self.tested.get(&reference).and_then(|t| t.field.as_ref()) {
            Some(f) => f,
            None => return Ok((f64::INFINITY, MetricKind::Baseline, None)),
        };
        let d = if reference < n {
            convergence_metric(reference_field, field)?
        } else {
            convergence_metric(field, reference_field)?
        };
        Ok((d.value, d.kind, Some(reference)))
    }

    /// Run resolution n once and log it. Returns its metric.
    fn test(&mut self, n: usize) -> Result<f64> {
        if let Some(t) = self.tested.get(&n) {
            return Ok(t.metric);
        }
        if self.cancel.is_cancelled() {
            return Err(VortError::UserCancelled);
        }
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(e) = monitor.start(n) {
                log::warn!("energy monitor failed to start at N = {}: {}", n, e);
            }
        }
        let result = {
            let observer = &mut self.observer;
            self.backend.run(n, &mut |field: &VorticityField, time: f64| {
                if let Some(o) = observer.as_mut() {
                    o.on_snapshot(field, time);
                }
            })
        };
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(e) = monitor.stop(n) {
                log::warn!("energy monitor failed to stop at N = {}: {}", n, e);
            }
        }
        let result = result?;

        let field = if result.run_ok {
            result.final_field().cloned()
        } else {
            None
        };
        let (metric, kind, reference) = match &field {
            Some(f) => self.discrepancy(n, f)?,
            None => (f64::INFINITY, MetricKind::Diverged, None),
        };
        self.last_diverged = field.is_none();

        let point = ConvergencePoint {
            n,
            metric_value: metric,
            metric_kind: kind,
            wall_time: result.wall_time,
        };
        self.cumulative_time += result.wall_time;
        self.log.push(IterationRecord {
            iteration_index: self.log.len(),
            phase_name: self.state.phase.name().to_string(),
            n,
            metric_value: metric,
            metric_kind: kind,
            wall_time_seconds: result.wall_time,
            cumulative_time_seconds: self.cumulative_time,
            tolerance: self.settings.tolerance,
            reference_n: reference,
        });
        if let Some(o) = self.observer.as_mut() {
            o.on_resolution_tested(&point);
        }
        log::debug!("{}: N = {} metric = {:.4e}", self.state.phase.name(), n, metric);
        self.state.tested_points.push(point);
        self.tested.insert(n, Tested { metric, field });
        Ok(metric)
    }

    fn initial_pair(&mut self) -> Result<Phase> {
        let n_max = self.settings.n_max;
        let mut n1 = self.settings.n_initial;
        if self.settings.seed_coarse && n1 / 2 >= MIN_POINTS {
            self.test(n1 / 2)?;
        }
        loop {
            self.test(n1)?;
            let n2 = (2 * n1).min(n_max);
            if self.diverged(n1) {
                if n2 <= n1 {
                    return Ok(self.fail_exhausted(n1));
                }
                log::info!("N = {} diverged, shift pair to ({}, {})", n1, n2, 2 * n2);
                n1 = n2;
                continue;
            }
            if n2 <= n1 {
                // n1 == n_max, no room for a pair
                if self.passes(self.metric_of(n1)) {
                    return Ok(self.refine_below(n1));
                }
                return Ok(self.fail_exhausted(n1));
            }
            self.test(n2)?;
            if self.diverged(n2) {
                log::info!("N = {} diverged, shift pair upwards", n2);
                n1 = n2;
                continue;
            }
            self.pair = (n1, n2);
            break;
        }

        let (n1, n2) = self.pair;
        if self.passes(self.metric_of(n1)) {
            return Ok(self.refine_below(n1));
        }
        if self.passes(self.metric_of(n2)) {
            return Ok(self.enter_refine(n1, n2));
        }
        Ok(Phase::RichardsonPredict)
    }

    fn richardson_predict(&mut self) -> Result<Phase> {
        let (n1, n2) = self.pair;
        let (e1, e2) = (self.metric_of(n1), self.metric_of(n2));
        let tol = self.settings.tolerance;
        let (n_max, policy) = (self.settings.n_max, self.settings.policy);
        if !(e1.is_finite() && e2.is_finite()) {
            log::info!("no discrepancy for N = {} or N = {}, bracketing", n1, n2);
            return Ok(Phase::Bracketing);
        }

        let estimate = estimate_order(n1, e1, n2, e2)?;
        self.record_order(estimate.order);
        let order = match estimate.effective_order() {
            Some(p) => p,
            None => {
                log::info!("order {:.3} not trusted, bracketing", estimate.order);
                return Ok(Phase::Bracketing);
            }
        };
        let target = predict_resolution(n1, e1, order, tol, n2, n_max, policy);
        log::info!("observed order {:.3}, predicted N = {}", estimate.order, target);
        if self.tested.contains_key(&target) {
            return Ok(Phase::Bracketing);
        }
        let e_target = self.test(target)?;
        if self.passes(e_target) {
            self.n_star = Some(target);
            return Ok(Phase::Converged);
        }

        // Single re-prediction from (n2, target)
        let estimate = estimate_order(n2, e2, target, e_target)?;
        self.record_order(estimate.order);
        let order = match estimate.effective_order() {
            Some(p) => p,
            None => return Ok(Phase::Bracketing),
        };
        let retarget = predict_resolution(n2, e2, order, tol, target, n_max, policy);
        log::info!("observed order {:.3}, predicted N = {}", estimate.order, retarget);
        if self.tested.contains_key(&retarget) {
            return Ok(Phase::Bracketing);
        }
        let e_retarget = self.test(retarget)?;
        if self.passes(e_retarget) {
            self.n_star = Some(retarget);
            return Ok(Phase::Converged);
        }
        Ok(Phase::Bracketing)
    }

    fn bracketing(&mut self) -> Result<Phase> {
        let n_max = self.settings.n_max;
        let mut n_fail = self
            .tested
            .iter()
            .rev()
            .find(|(_, t)| !self.passes(t.metric))
            .map(|(n, _)| *n)
            .ok_or_else(|| VortError::invalid("bracketing without a failing resolution"))?;
        loop {
            if n_fail >= n_max {
                return Ok(self.fail_exhausted(n_fail));
            }
            let next = (2 * n_fail).min(n_max);
            let metric = self.test(next)?;
            if self.passes(metric) {
                return Ok(self.enter_refine(n_fail, next));
            }
            n_fail = next;
        }
    }

    /// Metric of n against the bisection anchor, reusing earlier runs
    fn metric_against_anchor(&mut self, n: usize, anchor: usize) -> Result<f64> {
        match self.tested.get(&n) {
            Some(t) => match (&t.field, self.tested.get(&anchor).and_then(|a| a.field.as_ref())) {
                (Some(field), Some(anchor_field)) => Ok(convergence_metric(field, anchor_field)?.value),
                _ => Ok(f64::INFINITY),
            },
            None => self.test(n),
        }
    }

    /// Pass criterion of the bisection
    fn agrees_with(&mut self, n: usize, reference: usize) -> Result<bool> {
        if n == reference {
            return Ok(true);
        }
        let metric = self.metric_against_anchor(n, reference)?;
        Ok(self.passes(metric))
    }

    /// Finest successful run, running `2 high` first if nothing finer
    /// than `high` exists and the budget allows it.
    fn bisection_reference(&mut self, high: usize) -> Result<usize> {
        let finest = self
            .tested
            .iter()
            .rev()
            .find(|(_, t)| t.field.is_some())
            .map(|(n, _)| *n)
            .ok_or_else(|| VortError::invalid("binary refine without a successful run"))?;
        if finest > high {
            return Ok(finest);
        }
        let finer = (2 * high).min(self.settings.n_max);
        if finer > high {
            self.test(finer)?;
            if !self.diverged(finer) {
                return Ok(finer);
            }
        }
        Ok(high)
    }

    fn binary_refine(&mut self) -> Result<Phase> {
        let high = match (self.state.n_low, self.state.n_high) {
            (Some(low), Some(high)) if low < high => high,
            _ => return Err(VortError::invalid("binary refine without a valid bracket")),
        };
        let reference = self.bisection_reference(high)?;
        self.anchor = Some(reference);

        // Realign: largest run below the reference that disagrees with it,
        // then the smallest run above that which agrees.
        let below: Vec<usize> = self.tested.range(..reference).map(|(n, _)| *n).collect();
        let mut low = MIN_POINTS - 1;
        for &n in below.iter().rev() {
            if !self.agrees_with(n, reference)? {
                low = n;
                break;
            }
        }
        let mut high = reference;
        for &n in below.iter().filter(|&&n| n > low) {
            if self.agrees_with(n, reference)? {
                high = n;
                break;
            }
        }
        log::debug!("bisect ({}, {}] against N = {}", low, high, reference);

        let (low, high, evaluations) = bisect(low, high, |mid| self.agrees_with(mid, reference))?;
        log::debug!("bisection finished after {} evaluations", evaluations);
        self.state.n_low = if low >= MIN_POINTS { Some(low) } else { None };
        self.state.n_high = Some(high);
        self.n_star = Some(high);
        Ok(Phase::Converged)
    }
}

/// Search the minimal n x n resolution of a periodic `domain` whose final
/// vorticity agrees with its reference within `tolerance`.
///
/// # Errors
/// See [`ConvergenceController::run`].
pub fn find_converged_resolution(
    n_initial: usize,
    n_max: usize,
    tolerance: f64,
    domain: [f64; 2],
    physics: &PhysicsParams,
    ic: &InitialCondition,
    time: &TimeParams,
) -> Result<ConvergenceOutcome> {
    let backend = SimulationBackend::new(domain, *physics, ic.clone(), *time);
    ConvergenceController::new(backend, SearchSettings::new(n_initial, n_max, tolerance))?.run()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::IcKind;
    use crate::grid::GridSpec;
    use crate::hooks::MonitorError;
    use crate::vorticity::Snapshot;
    use ndarray::Array2;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::f64::consts::PI;
    use std::rc::Rc;
    use std::sync::Arc;

    /// Analytic "solutions" diverging below a threshold: either
    /// sin(x) cos(y) (1 + c / n^2), or a uniform field whose value only
    /// depends on n, so that discrepancies are exactly
    /// |level(m) - level(n)| / |level(n)|.
    struct Synthetic {
        level: Box<dyn Fn(usize) -> f64>,
        uniform: bool,
        diverge_below: usize,
        calls: Rc<RefCell<Vec<usize>>>,
    }

    impl Synthetic {
        fn new(c: f64, diverge_below: usize) -> Self {
            Self {
                level: Box::new(move |n| 1. + c / (n * n) as f64),
                uniform: false,
                diverge_below,
                calls: Rc::new(RefCell::new(vec![])),
            }
        }

        fn uniform<F: Fn(usize) -> f64 + 'static>(level: F) -> Self {
            Self {
                level: Box::new(level),
                uniform: true,
                diverge_below: 0,
                calls: Rc::new(RefCell::new(vec![])),
            }
        }
    }

    impl ResolutionBackend for Synthetic {
        fn run(&mut self, n: usize, on_snapshot: &mut dyn FnMut(&VorticityField, f64)) -> Result<SimulationResult> {
            self.calls.borrow_mut().push(n);
            let grid = Arc::new(GridSpec::new(n, n, 2. * PI, 2. * PI)?);
            let (x, y) = (grid.x(), grid.y());
            let scale = (self.level)(n);
            let omega = if self.uniform {
                Array2::from_elem((n, n), scale)
            } else {
                Array2::from_shape_fn((n, n), |(i, j)| x[i].sin() * y[j].cos() * scale)
            };
            let field = VorticityField::from_array(grid.clone(), omega)?;
            let run_ok = n >= self.diverge_below;
            on_snapshot(&field, 1.0);
            Ok(SimulationResult {
                grid,
                omega_snapshots: vec![Snapshot {
                    step: 1,
                    time: 1.0,
                    field,
                }],
                enstrophy_trace: vec![],
                peak_vorticity_trace: vec![],
                energy_trace: vec![],
                cfl_trace: vec![],
                wall_time: 0.5,
                steps_taken: 1,
                run_ok,
                error_kind: if run_ok { None } else { Some(ErrorKind::Divergence) },
            })
        }
    }

    #[derive(Default)]
    struct PhaseTrace {
        phases: Rc<RefCell<Vec<Phase>>>,
    }

    impl ConvergenceObserver for PhaseTrace {
        fn on_phase_change(&mut self, phase: Phase) {
            self.phases.borrow_mut().push(phase);
        }
    }

    /// Run the search, returning outcome, solver calls and phase sequence
    fn search(backend: Synthetic, settings: SearchSettings) -> (ConvergenceOutcome, Vec<usize>, Vec<Phase>) {
        let calls = backend.calls.clone();
        let trace = PhaseTrace::default();
        let phases = trace.phases.clone();
        let outcome = ConvergenceController::new(backend, settings)
            .unwrap()
            .with_observer(Box::new(trace))
            .run()
            .unwrap();
        assert_logged_once(&outcome, &calls.borrow());
        let calls = calls.borrow().clone();
        let phases = phases.borrow().clone();
        (outcome, calls, phases)
    }

    fn phase_names(outcome: &ConvergenceOutcome) -> Vec<&str> {
        outcome.iteration_log.iter().map(|r| r.phase_name.as_str()).collect()
    }

    fn assert_logged_once(outcome: &ConvergenceOutcome, calls: &[usize]) {
        let logged: Vec<usize> = outcome.iteration_log.iter().map(|r| r.n).collect();
        assert_eq!(logged, calls.to_vec());
        let unique: HashSet<usize> = logged.iter().copied().collect();
        assert_eq!(unique.len(), logged.len(), "resolution logged twice: {:?}", logged);
        for (i, record) in outcome.iteration_log.iter().enumerate() {
            assert_eq!(record.iteration_index, i);
            assert!((record.cumulative_time_seconds - 0.5 * (i + 1) as f64).abs() < 1e-12);
        }
        assert_eq!(outcome.tested_points.len(), logged.len());
    }

    #[test]
    fn test_synthetic_search_converges() {
        let (outcome, _, phases) = search(Synthetic::new(10., 0), SearchSettings::new(8, 512, 1e-2));
        assert!(outcome.converged);
        let n_star = outcome.n_star.unwrap();
        assert!(n_star <= 512);
        assert!(outcome.failure.is_none());
        assert!(outcome.order_estimate.is_some());
        assert_eq!(phases.last(), Some(&Phase::Converged));
        // seed is the baseline
        assert_eq!(outcome.iteration_log[0].n, 4);
        assert_eq!(outcome.iteration_log[0].metric_kind, MetricKind::Baseline);
        assert_eq!(outcome.iteration_log[0].phase_name, "InitialPair");
    }

    #[test]
    fn test_diverging_pairs_are_shifted() {
        let (outcome, calls, _) = search(Synthetic::new(10., 32), SearchSettings::new(8, 512, 1e-2));
        assert!(outcome.converged);
        assert_eq!(calls[..5], [4, 8, 16, 32, 64]);
        assert!(phase_names(&outcome)[..5].iter().all(|&p| p == "InitialPair"));
        for n in [4, 8, 16].iter() {
            let record = outcome.iteration_log.iter().find(|r| r.n == *n).unwrap();
            assert_eq!(record.metric_kind, MetricKind::Diverged);
            assert!(record.metric_value.is_infinite());
        }
        assert!(outcome.n_star.unwrap() >= 32);
    }

    #[test]
    fn test_everything_diverges() {
        let backend = || Synthetic::new(10., usize::MAX);
        let (outcome, calls, phases) = search(backend(), SearchSettings::new(8, 64, 1e-3));
        assert!(!outcome.converged);
        assert_eq!(outcome.n_star, None);
        assert_eq!(calls, vec![4, 8, 16, 32, 64]);
        assert_eq!(phases, vec![Phase::Failed]);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::Divergence);
        assert_eq!(failure.n_low, Some(64));
        assert_eq!(failure.best_n, None);

        let (outcome, calls, _) = search(backend(), SearchSettings::new(64, 64, 1e-3));
        assert_eq!(calls, vec![32, 64]);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::Divergence);
        assert_eq!(failure.n_low, Some(64));
    }

    #[test]
    fn test_pair_at_budget_is_run() {
        // discrepancy of 32 against 16 is 0.267
        let backend = Synthetic::uniform(|n| 1. + 100. / (n * n) as f64);
        let (outcome, calls, phases) = search(backend, SearchSettings::new(32, 32, 0.1));
        assert_eq!(calls, vec![16, 32]);
        assert_eq!(phases, vec![Phase::Failed]);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::ExhaustedBudget);
        assert_eq!(failure.n_low, Some(32));
        assert_eq!(failure.best_n, None);
    }

    #[test]
    fn test_bisection_against_fixed_reference() {
        // level 1 + 100 / n^2 agrees with n = 256 within 2e-2 from n = 69 on
        let backend = Synthetic::uniform(|n| 1. + 100. / (n * n) as f64);
        let settings = SearchSettings {
            seed_coarse: false,
            ..SearchSettings::new(8, 256, 2e-2)
        };
        let (outcome, calls, phases) = search(backend, settings);
        assert_eq!(
            phases,
            vec![
                Phase::RichardsonPredict,
                Phase::Bracketing,
                Phase::BinaryRefine,
                Phase::Converged
            ]
        );
        assert_eq!(calls, vec![8, 16, 32, 64, 128, 256, 96, 80, 72, 68, 70, 69]);
        assert_eq!(outcome.n_star, Some(69));
        let names = phase_names(&outcome);
        assert_eq!(names[..2], ["InitialPair", "InitialPair"]);
        assert_eq!(names[2..5], ["Bracketing", "Bracketing", "Bracketing"]);
        assert!(names[5..].iter().all(|&p| p == "BinaryRefine"));
        // the finer reference is compared with the bracket's upper end,
        // every bisection point with the reference
        assert_eq!(outcome.iteration_log[5].reference_n, Some(128));
        assert!(outcome.iteration_log[6..].iter().all(|r| r.reference_n == Some(256)));
        let at = |n: usize| outcome.iteration_log.iter().find(|r| r.n == n).unwrap().metric_value;
        assert!(at(68) > 2e-2);
        assert!(at(69) <= 2e-2);
    }

    #[test]
    fn test_loose_tolerance_refines_initial_pair() {
        let backend = Synthetic::uniform(|n| 1. + 100. / (n * n) as f64);
        let (outcome, calls, phases) = search(backend, SearchSettings::new(32, 1024, 0.3));
        assert_eq!(phases, vec![Phase::BinaryRefine, Phase::Converged]);
        // bisection of (16, 32] against the finest run, 64
        assert_eq!(calls, vec![16, 32, 64, 24, 20, 18, 17]);
        assert_eq!(outcome.n_star, Some(18));
        assert_eq!(
            phase_names(&outcome),
            vec![
                "InitialPair",
                "InitialPair",
                "InitialPair",
                "BinaryRefine",
                "BinaryRefine",
                "BinaryRefine",
                "BinaryRefine"
            ]
        );
        assert_eq!(outcome.order_estimate, None);
    }

    #[test]
    fn test_prediction_converges() {
        let backend = Synthetic::uniform(|n| 1. + 1. / (n * n) as f64);
        let (outcome, calls, phases) = search(backend, SearchSettings::new(16, 1024, 1e-3));
        assert_eq!(phases, vec![Phase::RichardsonPredict, Phase::Converged]);
        assert_eq!(calls, vec![8, 16, 32, 61]);
        assert_eq!(outcome.n_star, Some(61));
        assert_eq!(
            phase_names(&outcome),
            vec!["InitialPair", "InitialPair", "InitialPair", "RichardsonPredict"]
        );
        assert!((outcome.order_estimate.unwrap() - 2.).abs() < 1e-2);
    }

    #[test]
    fn test_single_re_prediction() {
        // first order tail makes the second order prediction miss
        let backend = Synthetic::uniform(|n| 1. + 1. / (n * n) as f64 + 0.05 / n as f64);
        let (outcome, calls, phases) = search(backend, SearchSettings::new(16, 1024, 1e-3));
        assert_eq!(phases, vec![Phase::RichardsonPredict, Phase::Converged]);
        assert_eq!(calls, vec![8, 16, 32, 87, 219]);
        assert!(outcome.iteration_log[3].metric_value > 1e-3);
        assert_eq!(outcome.iteration_log[4].reference_n, Some(87));
        assert_eq!(outcome.n_star, Some(219));
        assert_eq!(phase_names(&outcome)[3..], ["RichardsonPredict", "RichardsonPredict"]);
        assert!((outcome.order_estimate.unwrap() - 0.895).abs() < 1e-2);
    }

    #[test]
    fn test_prediction_already_tested() {
        // n_max caps the pair at (16, 24), the prediction can only be 24
        let backend = Synthetic::uniform(|n| 1. + 1. / (n * n) as f64);
        let (outcome, calls, phases) = search(backend, SearchSettings::new(16, 24, 1e-3));
        assert_eq!(
            phases,
            vec![Phase::RichardsonPredict, Phase::Bracketing, Phase::Failed]
        );
        assert_eq!(calls, vec![8, 16, 24]);
        assert!(phase_names(&outcome).iter().all(|&p| p == "InitialPair"));
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::ExhaustedBudget);
        assert_eq!(failure.n_low, Some(24));
    }

    #[test]
    fn test_cancel_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let settings = SearchSettings::new(8, 64, 1e-3);
        let outcome = ConvergenceController::new(Synthetic::new(1., 0), settings)
            .unwrap()
            .with_cancel_token(token)
            .run()
            .unwrap();
        assert!(!outcome.converged);
        assert!(outcome.iteration_log.is_empty());
        assert_eq!(outcome.failure.unwrap().reason, FailureReason::UserCancelled);
    }

    struct CancelAfter {
        token: CancelToken,
        seen: Rc<Cell<usize>>,
        snapshots: Rc<Cell<usize>>,
        limit: usize,
    }

    impl ConvergenceObserver for CancelAfter {
        fn on_resolution_tested(&mut self, _point: &ConvergencePoint) {
            self.seen.set(self.seen.get() + 1);
            if self.seen.get() == self.limit {
                self.token.cancel();
            }
        }

        fn on_snapshot(&mut self, _field: &VorticityField, _time: f64) {
            self.snapshots.set(self.snapshots.get() + 1);
        }
    }

    #[test]
    fn test_cancel_between_resolutions() {
        let token = CancelToken::new();
        let seen = Rc::new(Cell::new(0));
        let snapshots = Rc::new(Cell::new(0));
        let observer = CancelAfter {
            token: token.clone(),
            seen: seen.clone(),
            snapshots: snapshots.clone(),
            limit: 2,
        };
        let settings = SearchSettings::new(8, 1024, 1e-6);
        let outcome = ConvergenceController::new(Synthetic::new(1., 0), settings)
            .unwrap()
            .with_observer(Box::new(observer))
            .with_cancel_token(token)
            .run()
            .unwrap();
        assert_eq!(outcome.iteration_log.len(), 2);
        assert_eq!(seen.get(), 2);
        assert_eq!(snapshots.get(), 2);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::UserCancelled);
        assert_eq!(failure.best_n, None);
    }

    struct BrokenMonitor {
        starts: Rc<Cell<usize>>,
    }

    impl EnergyMonitor for BrokenMonitor {
        fn start(&mut self, _n: usize) -> std::result::Result<(), MonitorError> {
            self.starts.set(self.starts.get() + 1);
            Err("no sensor".into())
        }

        fn stop(&mut self, _n: usize) -> std::result::Result<(), MonitorError> {
            Err("no sensor".into())
        }
    }

    #[test]
    fn test_failing_energy_monitor_is_ignored() {
        let starts = Rc::new(Cell::new(0));
        let settings = SearchSettings::new(8, 512, 1e-2);
        let outcome = ConvergenceController::new(Synthetic::new(10., 0), settings)
            .unwrap()
            .with_energy_monitor(Box::new(BrokenMonitor { starts: starts.clone() }))
            .run()
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(starts.get(), outcome.iteration_log.len());
    }

    #[test]
    fn test_invalid_settings() {
        let backend = || Synthetic::new(1., 0);
        assert!(ConvergenceController::new(backend(), SearchSettings::new(3, 64, 1e-3)).is_err());
        assert!(ConvergenceController::new(backend(), SearchSettings::new(64, 32, 1e-3)).is_err());
        assert!(ConvergenceController::new(backend(), SearchSettings::new(8, 64, 0.)).is_err());
    }

    fn taylor_green() -> InitialCondition {
        InitialCondition::from_coefficients(IcKind::TaylorGreen, &[1.0, 1.0]).unwrap()
    }

    #[test]
    fn test_small_budget_is_exhausted() {
        let physics = PhysicsParams { nu: 1e-2 };
        let time = TimeParams {
            t_final: 0.05,
            dt: 0.01,
            snapshot_every: 5,
        };
        let outcome =
            find_converged_resolution(8, 16, 1e-12, [2. * PI, 2. * PI], &physics, &taylor_green(), &time).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.failure.unwrap().reason, FailureReason::ExhaustedBudget);
        let logged: Vec<usize> = outcome.iteration_log.iter().map(|r| r.n).collect();
        assert_eq!(logged, vec![4, 8, 16]);
        assert!(outcome.iteration_log[1..]
            .iter()
            .all(|r| r.metric_kind == MetricKind::L2 && r.metric_value > 1e-12));
    }

    #[test]
    fn test_zero_fields_are_degenerate() {
        let physics = PhysicsParams { nu: 1e-2 };
        let time = TimeParams {
            t_final: 0.02,
            dt: 0.01,
            snapshot_every: 1,
        };
        let zero = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[0.0, 0.5, 0.0, 0.0]).unwrap();
        let err = find_converged_resolution(8, 64, 1e-3, [4., 4.], &physics, &zero, &time).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateComparison);
    }

    proptest! {
        #[test]
        fn bisect_terminates_in_log_steps(low in 4_usize..1000, gap in 1_usize..5000, frac in 0.0_f64..1.0) {
            let high = low + gap;
            let threshold = low + 1 + ((gap - 1) as f64 * frac) as usize;
            let (l, h, evals) = bisect(low, high, |n| Ok(n >= threshold)).unwrap();
            prop_assert_eq!(h, threshold);
            prop_assert_eq!(h - l, 1);
            let bound = (gap as f64).log2().ceil() as usize;
            prop_assert!(evals <= bound);
        }
    }
}
