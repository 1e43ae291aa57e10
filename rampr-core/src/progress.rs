use std::time::Duration;

use rampr_metrics::{MetricSnapshot, RunningStats, per_sec};

use crate::builtin_metrics::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS,
};
use crate::schedule::StageSnapshot;
use crate::state::RunState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,

    /// Failed requests / total requests during the last interval (0..=1).
    pub error_rate_now: f64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub bytes_sent_total: u64,
    pub bytes_received_total: u64,
    pub checks_passed_total: u64,
    pub checks_failed_total: u64,

    /// Requests/sec statistics across progress intervals.
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    /// Whole-run latency, milliseconds.
    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,

    /// p95 latency of the last interval only.
    pub latency_p95_ms_now: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    /// Time since the previous emission.
    pub interval: Duration,
    pub state: RunState,
    pub target_vus: u64,
    pub active_vus: u64,
    /// VU tasks still alive, including retired ones finishing an iteration.
    pub live_vus: u64,
    pub total_duration: Duration,
    pub stage: Option<StageProgress>,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Turns successive cumulative snapshots into [`LiveMetrics`].
#[derive(Debug, Default)]
pub(crate) struct LiveTracker {
    prev: Option<MetricSnapshot>,
    rps: RunningStats,
}

impl LiveTracker {
    pub(crate) fn update(&mut self, snap: &MetricSnapshot) -> LiveMetrics {
        let interval = match &self.prev {
            Some(prev) => snap.delta_since(prev),
            None => snap.clone(),
        };
        let dt_secs = interval.elapsed().as_secs_f64();

        let requests_total = snap.counter(HTTP_REQS).unwrap_or_default();
        let requests_now = interval.counter(HTTP_REQS).unwrap_or_default();
        let rps_now = per_sec(requests_now, dt_secs);
        self.rps.push(rps_now);

        let (failed_total, _) = snap.rate(HTTP_REQ_FAILED).unwrap_or_default();
        let (failed_now, total_now) = interval.rate(HTTP_REQ_FAILED).unwrap_or_default();
        let error_rate_now = if total_now > 0 {
            failed_now as f64 / total_now as f64
        } else {
            0.0
        };

        let (checks_passed, checks_total) = snap.rate(CHECKS).unwrap_or_default();

        // Average over the whole run rather than over ticks, so jitter in tick
        // spacing does not skew it.
        let elapsed_secs = snap.elapsed().as_secs_f64();
        let req_per_sec_avg = if elapsed_secs > 0.0 {
            requests_total as f64 / elapsed_secs
        } else {
            0.0
        };

        let latency = snap.histogram(HTTP_REQ_DURATION);
        let latency_now = interval.histogram(HTTP_REQ_DURATION);

        let live = LiveMetrics {
            rps_now,
            error_rate_now,
            requests_total,
            failed_requests_total: failed_total,
            iterations_total: snap.counter(ITERATIONS).unwrap_or_default(),
            bytes_sent_total: snap.counter(DATA_SENT).unwrap_or_default(),
            bytes_received_total: snap.counter(DATA_RECEIVED).unwrap_or_default(),
            checks_passed_total: checks_passed,
            checks_failed_total: checks_total.saturating_sub(checks_passed),
            req_per_sec_avg,
            req_per_sec_stdev: self.rps.stdev(),
            req_per_sec_max: self.rps.max(),
            latency_mean_ms: latency.and_then(|h| h.mean_ms()),
            latency_p50_ms: latency.and_then(|h| h.percentile_ms(50.0)),
            latency_p95_ms: latency.and_then(|h| h.percentile_ms(95.0)),
            latency_p99_ms: latency.and_then(|h| h.percentile_ms(99.0)),
            latency_max_ms: latency.and_then(|h| h.max_ms()),
            latency_p95_ms_now: latency_now.and_then(|h| h.percentile_ms(95.0)),
        };

        self.prev = Some(snap.clone());
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin_metrics::BuiltinMetrics;
    use rampr_metrics::{Registry, Sample};

    #[test]
    fn interval_rates_come_from_deltas() {
        let registry = Registry::new(2);
        let m = BuiltinMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let record = |n: u64, failed: bool| {
            for i in 0..n {
                registry
                    .record(
                        i as usize,
                        &[
                            Sample::count(m.http_reqs, 1),
                            Sample::hit(m.http_req_failed, failed),
                            Sample::micros(m.http_req_duration, 10_000),
                        ],
                    )
                    .unwrap_or_else(|e| panic!("{e}"));
            }
        };

        let mut tracker = LiveTracker::default();

        record(20, false);
        let first = tracker.update(&registry.snapshot(Duration::from_secs(1)));
        assert!((first.rps_now - 20.0).abs() < 1e-9);
        assert_eq!(first.error_rate_now, 0.0);

        record(10, true);
        let second = tracker.update(&registry.snapshot(Duration::from_secs(2)));
        assert!((second.rps_now - 10.0).abs() < 1e-9);
        assert!((second.error_rate_now - 1.0).abs() < 1e-9);
        assert_eq!(second.requests_total, 30);
        assert_eq!(second.failed_requests_total, 10);
        assert!((second.req_per_sec_avg - 15.0).abs() < 1e-9);
        assert!((second.req_per_sec_max - 20.0).abs() < 1e-9);
        assert!(second.latency_p50_ms.is_some_and(|p| (p - 10.0).abs() < 0.05));
    }

    #[test]
    fn empty_run_reports_zeroes() {
        let registry = Registry::new(1);
        BuiltinMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let live = LiveTracker::default().update(&registry.snapshot(Duration::ZERO));
        assert_eq!(live.requests_total, 0);
        assert_eq!(live.rps_now, 0.0);
        assert!(live.latency_p95_ms.is_none());
    }
}
