use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use rampr_metrics::MetricValue;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _test_path: &Path, _config: &rampr_core::TestConfig) {}

    fn progress(&self) -> Option<rampr_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &rampr_core::RunReport) -> anyhow::Result<()> {
        emit_json_line(&summary_document(report));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,
    pub state: String,

    pub target_vus: u64,
    pub active_vus: u64,
    pub live_vus: u64,
    pub stage: Option<usize>,
    pub stages: Option<usize>,

    pub requests_per_sec: f64,
    pub error_rate: f64,

    pub total_requests: u64,
    pub failed_requests: u64,
    pub iterations: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub checks_failed_total: u64,

    pub latency_mean: Option<f64>,
    pub latency_p50: Option<f64>,
    pub latency_p95: Option<f64>,
    pub latency_p99: Option<f64>,
    pub latency_max: Option<f64>,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
}

fn build_progress_line(u: &rampr_core::ProgressUpdate) -> JsonProgressLine {
    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),
        state: u.state.to_string(),

        target_vus: u.target_vus,
        active_vus: u.active_vus,
        live_vus: u.live_vus,
        stage: u.stage.as_ref().map(|s| s.stage),
        stages: u.stage.as_ref().map(|s| s.stages),

        requests_per_sec: m.rps_now,
        error_rate: m.error_rate_now,

        total_requests: m.requests_total,
        failed_requests: m.failed_requests_total,
        iterations: m.iterations_total,
        total_bytes_sent: m.bytes_sent_total,
        total_bytes_received: m.bytes_received_total,
        checks_failed_total: m.checks_failed_total,

        latency_mean: m.latency_mean_ms,
        latency_p50: m.latency_p50_ms,
        latency_p95: m.latency_p95_ms,
        latency_p99: m.latency_p99_ms,
        latency_max: m.latency_max_ms,

        req_per_sec_avg: m.req_per_sec_avg,
        req_per_sec_stdev: m.req_per_sec_stdev,
        req_per_sec_max: m.req_per_sec_max,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub state: String,
    pub passed: bool,
    pub elapsed_secs: f64,
    pub abort_reason: Option<String>,
    pub forced_terminations: usize,
    pub thresholds: Vec<JsonThreshold>,
    pub metrics: BTreeMap<String, JsonMetric>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub status: String,
    pub expected: f64,
    pub observed: Option<f64>,
    pub window_secs: Option<f64>,
    pub abort_on_fail: bool,
    pub error: Option<String>,
}

/// Metric values as reported in the summary. Durations are milliseconds.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonMetric {
    Counter {
        count: u64,
        rate: f64,
    },
    Gauge {
        value: i64,
        max: i64,
    },
    Rate {
        rate: Option<f64>,
        passes: u64,
        fails: u64,
    },
    Histogram {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
        stdev: Option<f64>,
    },
}

pub(crate) fn summary_document(report: &rampr_core::RunReport) -> JsonSummaryLine {
    let elapsed_secs = report.metrics.elapsed().as_secs_f64();

    let thresholds = report
        .thresholds
        .iter()
        .map(|t| JsonThreshold {
            metric: t.metric.clone(),
            expression: t.expression.clone(),
            status: t.status.to_string(),
            expected: t.expected,
            observed: t.observed,
            window_secs: t.window.map(|w| w.as_secs_f64()),
            abort_on_fail: t.abort_on_fail,
            error: t.error.clone(),
        })
        .collect();

    let metrics = report
        .metrics
        .iter()
        .map(|s| {
            let value = match &s.value {
                MetricValue::Counter(count) => JsonMetric::Counter {
                    count: *count,
                    rate: rampr_metrics::per_sec(*count, elapsed_secs),
                },
                MetricValue::Gauge { value, peak } => JsonMetric::Gauge {
                    value: *value,
                    max: *peak,
                },
                v @ MetricValue::Rate { total, hits } => JsonMetric::Rate {
                    rate: v.ratio(),
                    passes: *hits,
                    fails: total.saturating_sub(*hits),
                },
                MetricValue::Histogram(h) => {
                    let summary = h.summary();
                    JsonMetric::Histogram {
                        count: summary.count,
                        avg: summary.mean,
                        min: summary.min,
                        med: summary.med,
                        max: summary.max,
                        p90: summary.p90,
                        p95: summary.p95,
                        p99: summary.p99,
                        stdev: summary.stdev,
                    }
                }
            };
            (s.name.to_string(), value)
        })
        .collect();

    JsonSummaryLine {
        kind: "summary",
        state: report.state.to_string(),
        passed: report.passed,
        elapsed_secs: report.elapsed.as_secs_f64(),
        abort_reason: report.abort_reason.as_ref().map(ToString::to_string),
        forced_terminations: report.forced_terminations,
        thresholds,
        metrics,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
