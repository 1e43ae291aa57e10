#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed, including an abort on threshold breach.
    ThresholdsFailed = 11,

    /// The run was aborted before it could complete.
    Aborted = 13,

    /// Invalid CLI/config input (bad flags, durations, threshold syntax, unresolvable thresholds).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, metric aggregation failures, panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &rampr_core::RunReport) -> Self {
        use rampr_core::AbortReason;

        match &report.abort_reason {
            Some(AbortReason::ThresholdBreached { .. }) => Self::ThresholdsFailed,
            Some(AbortReason::ThresholdUnresolvable { .. }) => Self::InvalidInput,
            Some(AbortReason::Aggregation(_)) => Self::RuntimeError,
            Some(AbortReason::Requested) => Self::Aborted,
            None if report.thresholds_passed() => Self::Success,
            None => Self::ThresholdsFailed,
        }
    }
}
