//! Records of the convergence search
use serde::{Deserialize, Deserializer, Serialize};

/// serde_json writes non-finite floats as `null`; read those back as
/// infinity, the value of baseline and diverged metrics.
fn metric_or_infinity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// How the metric of a tested resolution was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Relative l2 norm of the difference
    L2,
    /// Relative difference of peak vorticities
    PeakVorticityFallback,
    /// First successful run, nothing to compare with (metric is infinite)
    Baseline,
    /// Run diverged (metric is infinite)
    Diverged,
}

/// One executed resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    /// Grid points per direction
    #[serde(rename = "N")]
    pub n: usize,
    /// Discrepancy to the reference resolution, infinite if unavailable
    #[serde(deserialize_with = "metric_or_infinity")]
    pub metric_value: f64,
    /// Origin of the metric
    pub metric_kind: MetricKind,
    /// Wall time of the run in seconds
    pub wall_time: f64,
}

/// Search phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Run a coarse pair of resolutions
    InitialPair,
    /// Predict the resolution from the observed order
    RichardsonPredict,
    /// Double until the tolerance is met
    Bracketing,
    /// Bisect between a failing and a passing resolution
    BinaryRefine,
    /// Done, minimal resolution found
    Converged,
    /// Done without result
    Failed,
}

impl Phase {
    /// Name used in iteration records
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialPair => "InitialPair",
            Self::RichardsonPredict => "RichardsonPredict",
            Self::Bracketing => "Bracketing",
            Self::BinaryRefine => "BinaryRefine",
            Self::Converged => "Converged",
            Self::Failed => "Failed",
        }
    }

    /// True for Converged and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Failed)
    }
}

/// Row of the iteration log, one per solver invocation.
///
/// Infinite metrics are written as `null` by serde_json and read back as
/// infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Position in the log, starting at 0
    pub iteration_index: usize,
    /// Phase that requested the run
    pub phase_name: String,
    /// Grid points per direction
    #[serde(rename = "N")]
    pub n: usize,
    /// Discrepancy to the reference resolution
    #[serde(deserialize_with = "metric_or_infinity")]
    pub metric_value: f64,
    /// Origin of the metric
    pub metric_kind: MetricKind,
    /// Wall time of this run
    pub wall_time_seconds: f64,
    /// Wall time of all runs so far
    pub cumulative_time_seconds: f64,
    /// Tolerance of the search
    pub tolerance: f64,
    /// Resolution the metric was computed against
    pub reference_n: Option<usize>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = IterationRecord {
            iteration_index: 2,
            phase_name: Phase::Bracketing.name().to_string(),
            n: 128,
            metric_value: f64::INFINITY,
            metric_kind: MetricKind::Diverged,
            wall_time_seconds: 1.5,
            cumulative_time_seconds: 3.0,
            tolerance: 1e-3,
            reference_n: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"N\":128"));
        assert!(json.contains("\"metric_value\":null"));
        assert!(json.contains("\"metric_kind\":\"diverged\""));
        assert!(json.contains("\"phase_name\":\"Bracketing\""));
    }

    #[test]
    fn test_infinite_metric_is_read_back() {
        let record = IterationRecord {
            iteration_index: 0,
            phase_name: Phase::InitialPair.name().to_string(),
            n: 16,
            metric_value: f64::INFINITY,
            metric_kind: MetricKind::Baseline,
            wall_time_seconds: 0.25,
            cumulative_time_seconds: 0.25,
            tolerance: 1e-3,
            reference_n: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: IterationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let point = ConvergencePoint {
            n: 32,
            metric_value: 2.5e-3,
            metric_kind: MetricKind::L2,
            wall_time: 1.0,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(serde_json::from_str::<ConvergencePoint>(&json).unwrap(), point);
        let diverged: ConvergencePoint =
            serde_json::from_str(r#"{"N":8,"metric_value":null,"metric_kind":"diverged","wall_time":0.1}"#).unwrap();
        assert!(diverged.metric_value.is_infinite());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Converged.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::BinaryRefine.is_terminal());
    }
}
