//! Empirical order of convergence and resolution prediction
//!
//! From two resolutions `n1 < n2` with discrepancies `e1, e2` the observed
//! order is
//! ..math:
//!  p = ln(e1 / e2) / ln(n2 / n1)
//!
//! and assuming `e ~ C n^-p`, the resolution that reaches a safety margin
//! below the tolerance is
//! ..math:
//!  n_target = n1 (e1 / (0.8 tol))^(1 / p)
use crate::error::{Result, VortError};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Smallest order that is trusted
pub const ORDER_MIN: f64 = 0.1;
/// Largest order that is trusted
pub const ORDER_MAX: f64 = 10.;
/// Order used for predictions when the observed order is implausibly high
pub const ORDER_CAP: f64 = 4.;
/// Target fraction of the tolerance
pub const SAFETY: f64 = 0.8;
/// Largest jump of a prediction relative to n2
pub const MAX_JUMP: usize = 4;

/// Classification of an observed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderValidity {
    /// ORDER_MIN <= p <= ORDER_MAX
    Valid,
    /// p < ORDER_MIN, NaN, or from non-finite data; not used for prediction
    Stagnant,
    /// p > ORDER_MAX; prediction uses ORDER_CAP
    Artifact,
}

/// Observed order of convergence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderEstimate {
    /// Raw estimate
    pub order: f64,
    /// Classification of the raw estimate
    pub validity: OrderValidity,
}

impl OrderEstimate {
    /// Order to predict with, `None` if the estimate is not trusted
    pub fn effective_order(&self) -> Option<f64> {
        match self.validity {
            OrderValidity::Valid => Some(self.order),
            OrderValidity::Artifact => Some(ORDER_CAP),
            OrderValidity::Stagnant => None,
        }
    }
}

/// Rounding of predicted resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSizePolicy {
    /// Any integer
    Any,
    /// Even integers
    Even,
    /// Powers of two
    PowerOfTwo,
}

impl Default for GridSizePolicy {
    fn default() -> Self {
        Self::Any
    }
}

impl GridSizePolicy {
    /// Nearest admissible size to `x` within `[lower, upper]`. Falls back
    /// to `upper` if no admissible size lies in the interval.
    fn round_within(self, x: f64, lower: usize, upper: usize) -> usize {
        let clamp = |n: usize| n.max(lower).min(upper);
        match self {
            Self::Any => clamp(x.round().to_usize().unwrap_or(upper)),
            Self::Even => {
                let n = clamp(((x / 2.).round() * 2.).to_usize().unwrap_or(upper));
                if n % 2 == 0 {
                    n
                } else if n + 1 <= upper {
                    n + 1
                } else if n > lower && n - 1 >= lower {
                    n - 1
                } else {
                    n
                }
            }
            Self::PowerOfTwo => {
                let exponent = x.max(1.).log2().round().to_u32().unwrap_or(63).min(63);
                let n = 1_usize.checked_shl(exponent).unwrap_or(upper);
                if n >= lower && n <= upper {
                    return n;
                }
                // largest power of two in range, else upper
                let mut p = 1_usize;
                while p.saturating_mul(2) <= upper {
                    p *= 2;
                }
                if p >= lower {
                    p
                } else {
                    upper
                }
            }
        }
    }
}

/// Observed order from two resolutions.
///
/// # Errors
/// `n1 >= n2`, `n1 == 0` or negative discrepancies.
///
/// # Example
/// ```
/// use rustvort::convergence::richardson::{estimate_order, OrderValidity};
/// let est = estimate_order(64, 4e-2, 128, 1e-2).unwrap();
/// assert!((est.order - 2.0).abs() < 1e-12);
/// assert_eq!(est.validity, OrderValidity::Valid);
/// ```
pub fn estimate_order(n1: usize, e1: f64, n2: usize, e2: f64) -> Result<OrderEstimate> {
    if n1 == 0 || n1 >= n2 {
        return Err(VortError::invalid(format!(
            "order estimate needs 0 < n1 < n2, got {} and {}",
            n1, n2
        )));
    }
    if e1 < 0. || e2 < 0. {
        return Err(VortError::invalid(format!(
            "discrepancies must be non-negative, got {} and {}",
            e1, e2
        )));
    }
    if !e1.is_finite() || !e2.is_finite() {
        return Ok(OrderEstimate {
            order: f64::NAN,
            validity: OrderValidity::Stagnant,
        });
    }
    let order = (e1 / e2).ln() / (n2 as f64 / n1 as f64).ln();
    let validity = if order.is_nan() || order < ORDER_MIN {
        OrderValidity::Stagnant
    } else if order > ORDER_MAX {
        OrderValidity::Artifact
    } else {
        OrderValidity::Valid
    };
    Ok(OrderEstimate { order, validity })
}

/// Predict the resolution that reaches `SAFETY * tol`.
///
/// The raw prediction is clamped into `[n2, min(n_max, MAX_JUMP * n2)]`
/// and rounded according to `policy`. If `n_max < n2` the result is `n_max`.
///
/// # Example
/// ```
/// use rustvort::convergence::richardson::{predict_resolution, GridSizePolicy};
/// // second order, error 4e-2 at 64: 1e-2 * 0.8 is reached near 143
/// let n = predict_resolution(64, 4e-2, 2.0, 1e-2, 128, 1024, GridSizePolicy::Any);
/// assert_eq!(n, 143);
/// ```
pub fn predict_resolution(
    n1: usize,
    e1: f64,
    order: f64,
    tol: f64,
    n2: usize,
    n_max: usize,
    policy: GridSizePolicy,
) -> usize {
    let upper = n_max.min(MAX_JUMP.saturating_mul(n2));
    if upper <= n2 {
        return upper;
    }
    let raw = n1 as f64 * (e1 / (SAFETY * tol)).powf(1. / order);
    let raw = if raw.is_nan() { upper as f64 } else { raw };
    let target = raw.max(n2 as f64).min(upper as f64);
    policy.round_within(target, n2, upper)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scenario_low_order() {
        let est = estimate_order(64, 2e-2, 128, 1.2e-2).unwrap();
        assert!((est.order - 0.737).abs() < 1e-3);
        assert_eq!(est.validity, OrderValidity::Valid);
        for &tol in &[1e-2, 1e-3, 1e-5] {
            let n = predict_resolution(64, 2e-2, est.order, tol, 128, 10_000, GridSizePolicy::Any);
            assert!(n >= 128 && n <= 512, "predicted {}", n);
        }
    }

    #[test]
    fn test_stagnant_and_artifact() {
        let flat = estimate_order(32, 1e-2, 64, 0.99e-2).unwrap();
        assert_eq!(flat.validity, OrderValidity::Stagnant);
        assert_eq!(flat.effective_order(), None);

        let growing = estimate_order(32, 1e-2, 64, 2e-2).unwrap();
        assert_eq!(growing.validity, OrderValidity::Stagnant);

        let steep = estimate_order(32, 1e-1, 64, 1e-6).unwrap();
        assert_eq!(steep.validity, OrderValidity::Artifact);
        assert_eq!(steep.effective_order(), Some(ORDER_CAP));

        let exact = estimate_order(32, 1e-2, 64, 0.).unwrap();
        assert_eq!(exact.validity, OrderValidity::Artifact);

        let diverged = estimate_order(32, f64::INFINITY, 64, 1e-2).unwrap();
        assert_eq!(diverged.validity, OrderValidity::Stagnant);

        let both_zero = estimate_order(32, 0., 64, 0.).unwrap();
        assert_eq!(both_zero.validity, OrderValidity::Stagnant);
    }

    #[test]
    fn test_invalid_input() {
        assert!(estimate_order(64, 1e-2, 64, 1e-3).is_err());
        assert!(estimate_order(0, 1e-2, 64, 1e-3).is_err());
        assert!(estimate_order(32, -1e-2, 64, 1e-3).is_err());
    }

    #[test]
    fn test_prediction_is_clamped() {
        // far away target is limited to 4 * n2
        assert_eq!(predict_resolution(16, 1.0, 1.0, 1e-6, 32, 10_000, GridSizePolicy::Any), 128);
        // and to n_max
        assert_eq!(predict_resolution(16, 1.0, 1.0, 1e-6, 32, 100, GridSizePolicy::Any), 100);
        // tolerance already met is lifted to n2
        assert_eq!(predict_resolution(16, 1e-4, 2.0, 1e-2, 32, 100, GridSizePolicy::Any), 32);
        // no room above n2
        assert_eq!(predict_resolution(16, 1.0, 2.0, 1e-2, 32, 32, GridSizePolicy::Any), 32);
    }

    #[test]
    fn test_rounding_policies() {
        assert_eq!(GridSizePolicy::Even.round_within(143.2, 128, 512), 144);
        assert_eq!(GridSizePolicy::Even.round_within(511.0, 128, 511), 510);
        assert_eq!(GridSizePolicy::PowerOfTwo.round_within(143.0, 128, 512), 128);
        assert_eq!(GridSizePolicy::PowerOfTwo.round_within(200.0, 128, 512), 256);
        assert_eq!(GridSizePolicy::PowerOfTwo.round_within(140.0, 129, 200), 200);
        assert_eq!(GridSizePolicy::Any.round_within(140.4, 129, 200), 140);
    }

    proptest! {
        #[test]
        fn recovers_exact_power_law(c in 0.01_f64..100., p in 0.5_f64..6., n1 in 4_usize..200, k in 2_usize..5) {
            let n2 = n1 * k;
            let e = |n: usize| c * (n as f64).powf(-p);
            let est = estimate_order(n1, e(n1), n2, e(n2)).unwrap();
            prop_assert!((est.order - p).abs() < 1e-9);
            prop_assert_eq!(est.validity, OrderValidity::Valid);
        }

        #[test]
        fn prediction_stays_in_bounds(
            n1 in 4_usize..100,
            e1 in 1e-6_f64..1.,
            p in 0.1_f64..10.,
            tol in 1e-8_f64..1e-1,
            n_max in 8_usize..5000,
        ) {
            let n2 = 2 * n1;
            for policy in [GridSizePolicy::Any, GridSizePolicy::Even, GridSizePolicy::PowerOfTwo].iter() {
                let n = predict_resolution(n1, e1, p, tol, n2, n_max, *policy);
                let upper = n_max.min(MAX_JUMP * n2);
                if upper <= n2 {
                    prop_assert_eq!(n, upper);
                } else {
                    prop_assert!(n >= n2 && n <= upper);
                }
            }
        }
    }
}
