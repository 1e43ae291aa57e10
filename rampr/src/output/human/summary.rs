use std::fmt::Write as _;

use rampr_core::{
    DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS,
    RunReport, ThresholdStatus, VUS, VUS_MAX,
};
use rampr_metrics::MetricValue;

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let m = &report.metrics;

    writeln!(
        out,
        "summary: {} after {}{}",
        report.state,
        format_duration(report.elapsed),
        if report.passed { "" } else { " (FAILED)" }
    )
    .ok();
    if let Some(reason) = &report.abort_reason {
        writeln!(out, "  abort reason: {reason}").ok();
    }
    if report.forced_terminations > 0 {
        writeln!(out, "  forced terminations: {}", report.forced_terminations).ok();
    }

    let requests = m.counter(HTTP_REQS).unwrap_or_default();
    let (failed, _) = m.rate(HTTP_REQ_FAILED).unwrap_or_default();
    writeln!(out, "  requests: {requests} (failed {failed})").ok();
    writeln!(
        out,
        "  iterations: {}",
        m.counter(ITERATIONS).unwrap_or_default()
    )
    .ok();
    writeln!(
        out,
        "  bytes: recv {} sent {}",
        format_bytes(m.counter(DATA_RECEIVED).unwrap_or_default()),
        format_bytes(m.counter(DATA_SENT).unwrap_or_default())
    )
    .ok();
    if let Some((_, peak)) = m.gauge(VUS) {
        let max = m.gauge(VUS_MAX).map(|(v, _)| v).unwrap_or(peak);
        writeln!(out, "  vus: peak {peak} of {max}").ok();
    }
    let secs = report.elapsed.as_secs_f64();
    if secs > 0.0 {
        writeln!(
            out,
            "  rates: rps={}",
            format_rate(rampr_metrics::per_sec(requests, secs))
        )
        .ok();
    }
    match m.histogram(HTTP_REQ_DURATION).filter(|h| !h.is_empty()) {
        Some(h) => {
            let s = h.summary();
            writeln!(
                out,
                "  latency = p50={} p95={} p99={} mean={} max={} (n={})",
                format_ms_opt(s.med),
                format_ms_opt(s.p95),
                format_ms_opt(s.p99),
                format_ms_opt(s.mean),
                format_ms_opt(s.max),
                s.count
            )
            .ok();
        }
        None => {
            out.push_str("  latency: n/a\n");
        }
    }

    render_thresholds(report, &mut out);
    render_metrics(report, &mut out);

    out
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let status = match t.status {
            ThresholdStatus::Pass => "PASS",
            ThresholdStatus::Fail => "FAIL",
            ThresholdStatus::Indeterminate => "N/A",
        };
        let observed = match (&t.error, t.observed) {
            (Some(err), _) => err.clone(),
            (None, Some(v)) => format!("observed {v:.4}"),
            (None, None) => "no data".to_string(),
        };
        let window = t
            .window
            .map(|w| format!(" over {}", format_duration(w)))
            .unwrap_or_default();
        writeln!(
            out,
            "  [{status}] {}: {}{window} ({observed}, expected {})",
            t.metric, t.expression, t.expected
        )
        .ok();
    }
}

fn render_metrics(report: &RunReport, out: &mut String) {
    let mut rows: Vec<_> = report.metrics.iter().collect();
    if rows.is_empty() {
        return;
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    out.push_str("\nmetrics\n");
    for s in rows {
        match &s.value {
            MetricValue::Counter(v) => {
                writeln!(out, "  {} = {v}", s.name).ok();
            }
            // Gauges like `vus` correctly end at 0, so show the peak too.
            MetricValue::Gauge { value, peak } => {
                writeln!(out, "  {} = end={value} peak={peak}", s.name).ok();
            }
            v @ MetricValue::Rate { total, hits } => match v.ratio() {
                Some(rate) => {
                    writeln!(out, "  {} = hits={hits} total={total} rate={rate:.3}", s.name).ok();
                }
                None => {
                    writeln!(out, "  {} = hits={hits} total={total}", s.name).ok();
                }
            },
            MetricValue::Histogram(h) => {
                let h = h.summary();
                writeln!(
                    out,
                    "  {} = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
                    s.name,
                    format_ms_opt(h.med),
                    format_ms_opt(h.p90),
                    format_ms_opt(h.p95),
                    format_ms_opt(h.p99),
                    format_ms_opt(h.mean),
                    format_ms_opt(h.max),
                    h.count
                )
                .ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_core::{RunState, ThresholdResult};
    use rampr_metrics::{MetricKind, Registry, Sample};
    use std::time::Duration;

    fn report() -> RunReport {
        let registry = Registry::new(1);
        let reqs = registry
            .register(HTTP_REQS, MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let failed = registry
            .register(HTTP_REQ_FAILED, MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        let vus = registry
            .register(VUS, MetricKind::Gauge)
            .unwrap_or_else(|e| panic!("{e}"));
        registry
            .register(HTTP_REQ_DURATION, MetricKind::Histogram)
            .unwrap_or_else(|e| panic!("{e}"));

        let gauge = registry.gauge(vus).unwrap_or_else(|e| panic!("{e}"));
        gauge.set(4);
        gauge.set(0);

        let mut samples = vec![Sample::count(reqs, 10)];
        samples.extend((0..10).map(|i| Sample::hit(failed, i < 2)));
        registry
            .record(0, &samples)
            .unwrap_or_else(|e| panic!("{e}"));

        RunReport {
            state: RunState::Completed,
            passed: false,
            elapsed: Duration::from_secs(10),
            thresholds: vec![ThresholdResult {
                metric: HTTP_REQ_FAILED.to_string(),
                expression: "rate<0.01".to_string(),
                expected: 0.01,
                observed: Some(0.2),
                status: ThresholdStatus::Fail,
                window: None,
                abort_on_fail: false,
                error: None,
            }],
            metrics: registry.snapshot(Duration::from_secs(10)),
            abort_reason: None,
            forced_terminations: 0,
        }
    }

    #[test]
    fn render_includes_totals_and_thresholds() {
        let text = render(&report());
        assert!(text.contains("summary: completed after 10s (FAILED)"));
        assert!(text.contains("requests: 10 (failed 2)"));
        assert!(text.contains("rates: rps=1"));
        assert!(text.contains("latency: n/a"));
        assert!(text.contains("[FAIL] http_req_failed: rate<0.01 (observed 0.2000, expected 0.01)"));
    }

    #[test]
    fn render_shows_gauge_end_and_peak() {
        let text = render(&report());
        assert!(text.contains("vus = end=0 peak=4"));
        assert!(text.contains("vus: peak 4 of 4"));
        assert!(text.contains("http_req_failed = hits=2 total=10 rate=0.200"));
    }
}
