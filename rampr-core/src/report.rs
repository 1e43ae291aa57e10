use std::fmt;
use std::time::Duration;

use rampr_metrics::MetricSnapshot;

use crate::state::RunState;
use crate::thresholds_eval::ThresholdResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// `abort()` was called, e.g. a second interrupt from the user.
    Requested,
    ThresholdBreached { metric: String, expression: String },
    ThresholdUnresolvable { metric: String, reason: String },
    /// A worker or the aggregation layer failed.
    Aggregation(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("abort requested"),
            Self::ThresholdBreached { metric, expression } => {
                write!(f, "threshold `{metric}: {expression}` failed")
            }
            Self::ThresholdUnresolvable { metric, reason } => {
                write!(f, "threshold on `{metric}` cannot be evaluated: {reason}")
            }
            Self::Aggregation(msg) => write!(f, "metrics aggregation failed: {msg}"),
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    /// No threshold failed and the run was not aborted.
    pub passed: bool,
    pub elapsed: Duration,
    pub thresholds: Vec<ThresholdResult>,
    pub metrics: MetricSnapshot,
    pub abort_reason: Option<AbortReason>,
    /// VU tasks that had to be killed because they outlived the stop grace.
    pub forced_terminations: usize,
}

impl RunReport {
    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| t.failed())
    }

    pub fn thresholds_passed(&self) -> bool {
        self.failed_thresholds().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reasons_read_naturally() {
        let r = AbortReason::ThresholdBreached {
            metric: "http_req_failed".to_string(),
            expression: "rate<0.01".to_string(),
        };
        assert_eq!(r.to_string(), "threshold `http_req_failed: rate<0.01` failed");
        assert_eq!(AbortReason::Requested.to_string(), "abort requested");
    }
}
