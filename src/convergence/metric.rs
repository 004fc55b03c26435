//! Discrepancy between solutions at two resolutions
//!
//! The coarse field is interpolated onto the fine grid and compared by a
//! relative l2 norm. If that is not meaningful (non-finite interpolant or a
//! fine field that is numerically zero) the relative difference of the peak
//! vorticities is used instead.
use super::record::MetricKind;
use crate::error::{Result, VortError};
use crate::field::VorticityField;
use crate::vorticity::functions::{norm_l2_diff, norm_l2_f64};
use crate::vorticity::SimulationResult;

/// Norms and peaks below this are treated as zero
pub const NORM_FLOOR: f64 = 1e-10;

/// Value of a comparison and how it was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discrepancy {
    /// Relative difference, non-negative
    pub value: f64,
    /// L2 or peak vorticity fallback
    pub kind: MetricKind,
}

/// Compare a coarse and a fine field of the same domain.
///
/// # Errors
/// - `InvalidParameter` if the fields live on different domains
/// - `NonFinite` if either field contains NaN or infinity
/// - `DegenerateComparison` if both fields are numerically zero
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use rustvort::convergence::metric::convergence_metric;
/// use rustvort::field::VorticityField;
/// use rustvort::grid::GridSpec;
///
/// let grid = Arc::new(GridSpec::new(8, 8, 1.0, 1.0).unwrap());
/// let mut field = VorticityField::zeros(grid);
/// field.omega[[2, 3]] = 1.0;
/// assert_eq!(convergence_metric(&field, &field).unwrap().value, 0.0);
/// ```
pub fn convergence_metric(coarse: &VorticityField, fine: &VorticityField) -> Result<Discrepancy> {
    let peak_coarse = coarse.peak();
    let peak_fine = fine.peak();
    if !peak_coarse.is_finite() || !peak_fine.is_finite() {
        return Err(VortError::NonFinite("compared fields".to_string()));
    }

    let interpolated = coarse.interpolate_onto(&fine.grid)?;
    if interpolated.iter().any(|v| !v.is_finite()) {
        return peak_fallback(peak_coarse, peak_fine);
    }
    let norm_fine = norm_l2_f64(&fine.omega);
    if norm_fine < NORM_FLOOR {
        return peak_fallback(peak_coarse, peak_fine);
    }
    Ok(Discrepancy {
        value: norm_l2_diff(&interpolated, &fine.omega) / norm_fine,
        kind: MetricKind::L2,
    })
}

fn peak_fallback(peak_coarse: f64, peak_fine: f64) -> Result<Discrepancy> {
    let reference = if peak_fine >= NORM_FLOOR {
        peak_fine
    } else if peak_coarse >= NORM_FLOOR {
        peak_coarse
    } else {
        return Err(VortError::DegenerateComparison {
            peak_coarse,
            peak_fine,
        });
    };
    Ok(Discrepancy {
        value: (peak_coarse - peak_fine).abs() / reference,
        kind: MetricKind::PeakVorticityFallback,
    })
}

/// Compare the final snapshots of two runs.
///
/// # Errors
/// A run without snapshots, or see [`convergence_metric`].
pub fn compare_results(coarse: &SimulationResult, fine: &SimulationResult) -> Result<Discrepancy> {
    match (coarse.final_field(), fine.final_field()) {
        (Some(c), Some(f)) => convergence_metric(c, f),
        _ => Err(VortError::invalid("cannot compare a run without snapshots")),
    }
}
