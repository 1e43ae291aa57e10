use std::collections::VecDeque;
use std::time::Duration;

use rampr_metrics::{MetricSeries, MetricSnapshot, MetricValue};

use crate::config::ThresholdSpec;
use crate::thresholds::{ThresholdAgg, ThresholdExpr, parse_threshold_expr};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdStatus {
    Pass,
    Fail,
    /// The metric has no samples yet.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub expected: f64,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
    pub window: Option<Duration>,
    pub abort_on_fail: bool,
    /// Set when the threshold could not be evaluated at all.
    pub error: Option<String>,
}

impl ThresholdResult {
    pub fn failed(&self) -> bool {
        self.status == ThresholdStatus::Fail
    }
}

#[derive(Debug, Clone)]
struct Compiled {
    spec: ThresholdSpec,
    expr: ThresholdExpr,
}

/// Parsed thresholds, evaluated against metric snapshots.
#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    entries: Vec<Compiled>,
}

impl ThresholdEvaluator {
    pub fn compile(specs: &[ThresholdSpec]) -> Result<Self> {
        let entries = specs
            .iter()
            .map(|spec| {
                let expr = parse_threshold_expr(&spec.expression).map_err(|error| {
                    Error::InvalidThreshold {
                        metric: spec.metric.clone(),
                        error,
                    }
                })?;
                Ok(Compiled {
                    spec: spec.clone(),
                    expr,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Longest trailing window any threshold asks for.
    pub fn max_window(&self) -> Option<Duration> {
        self.entries.iter().filter_map(|c| c.spec.window).max()
    }

    /// Evaluates every threshold. The first one that cannot be resolved
    /// against `current` turns into [`Error::ThresholdUnresolvable`].
    pub fn evaluate(
        &self,
        current: &MetricSnapshot,
        history: &SnapshotHistory,
    ) -> Result<Vec<ThresholdResult>> {
        self.entries
            .iter()
            .map(|c| evaluate_one(c, current, history))
            .collect()
    }

    /// Like [`Self::evaluate`] but never fails: unresolvable thresholds are
    /// reported as failed with their error attached.
    pub fn evaluate_final(
        &self,
        current: &MetricSnapshot,
        history: &SnapshotHistory,
    ) -> Vec<ThresholdResult> {
        self.entries
            .iter()
            .map(|c| {
                evaluate_one(c, current, history).unwrap_or_else(|err| ThresholdResult {
                    error: Some(err.to_string()),
                    ..result_for(c, None, ThresholdStatus::Fail)
                })
            })
            .collect()
    }

    /// First failed threshold that should abort the run at `elapsed`.
    pub fn abort_trigger<'a>(
        &self,
        results: &'a [ThresholdResult],
        elapsed: Duration,
    ) -> Option<&'a ThresholdResult> {
        self.entries
            .iter()
            .zip(results)
            .find(|(c, r)| {
                r.failed()
                    && c.spec.abort_on_fail
                    && elapsed >= c.spec.delay_abort_eval.unwrap_or(Duration::ZERO)
            })
            .map(|(_, r)| r)
    }
}

fn result_for(c: &Compiled, observed: Option<f64>, status: ThresholdStatus) -> ThresholdResult {
    ThresholdResult {
        metric: c.spec.metric.clone(),
        expression: c.spec.expression.clone(),
        expected: c.expr.value,
        observed,
        status,
        window: c.spec.window,
        abort_on_fail: c.spec.abort_on_fail,
        error: None,
    }
}

fn evaluate_one(
    c: &Compiled,
    current: &MetricSnapshot,
    history: &SnapshotHistory,
) -> Result<ThresholdResult> {
    let unresolvable = |reason: String| Error::ThresholdUnresolvable {
        metric: c.spec.metric.clone(),
        reason,
    };

    let windowed;
    let view = match c.spec.window {
        Some(window) => {
            windowed = history.window(current, window);
            &windowed
        }
        None => current,
    };

    let series = view
        .get(&c.spec.metric)
        .ok_or_else(|| unresolvable("metric is not defined".to_string()))?;
    let observed = observe(series, c.expr.agg, view.elapsed()).map_err(unresolvable)?;

    let status = match observed {
        None => ThresholdStatus::Indeterminate,
        Some(v) if c.expr.op.holds(v, c.expr.value) => ThresholdStatus::Pass,
        Some(_) => ThresholdStatus::Fail,
    };
    Ok(result_for(c, observed, status))
}

/// Observed value of `agg` over `series`. `Ok(None)` means the aggregation
/// has no value without samples (ratios, averages, percentiles); counts are
/// always observable and start at zero. `Err` means the aggregation does not
/// apply to this kind of metric.
fn observe(
    series: &MetricSeries,
    agg: ThresholdAgg,
    elapsed: Duration,
) -> std::result::Result<Option<f64>, String> {
    let inapplicable = || Err(format!("`{agg}` does not apply to {} metrics", series.kind));

    match (&series.value, agg) {
        (MetricValue::Counter(v), ThresholdAgg::Count) => Ok(Some(*v as f64)),
        (MetricValue::Counter(v), ThresholdAgg::Rate) => {
            let secs = elapsed.as_secs_f64();
            Ok((secs > 0.0).then(|| *v as f64 / secs))
        }

        (value @ MetricValue::Rate { .. }, ThresholdAgg::Rate) => Ok(value.ratio()),
        (MetricValue::Rate { total, .. }, ThresholdAgg::Count) => Ok(Some(*total as f64)),

        (MetricValue::Gauge { value, .. }, ThresholdAgg::Value) => Ok(Some(*value as f64)),
        (MetricValue::Gauge { peak, .. }, ThresholdAgg::Max) => Ok(Some(*peak as f64)),

        (MetricValue::Histogram(h), agg) => match agg {
            ThresholdAgg::Count => Ok(Some(h.count() as f64)),
            ThresholdAgg::Avg => Ok(h.mean_ms()),
            ThresholdAgg::Min => Ok(h.min_ms()),
            ThresholdAgg::Max => Ok(h.max_ms()),
            ThresholdAgg::Med => Ok(h.percentile_ms(50.0)),
            ThresholdAgg::P(p) => Ok(h.percentile_ms(p)),
            ThresholdAgg::Rate | ThresholdAgg::Value => inapplicable(),
        },

        _ => inapplicable(),
    }
}

/// Recent cumulative snapshots, kept just long enough to answer the longest
/// threshold window.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHistory {
    keep: Option<Duration>,
    entries: VecDeque<MetricSnapshot>,
}

impl SnapshotHistory {
    pub fn new(keep: Option<Duration>) -> Self {
        Self {
            keep,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, snapshot: MetricSnapshot) {
        let Some(keep) = self.keep else {
            return;
        };
        let horizon = snapshot.elapsed().saturating_sub(keep);
        self.entries.push_back(snapshot);

        // Keep one entry at or before the horizon as the window baseline.
        while self.entries.len() >= 2 && self.entries[1].elapsed() <= horizon {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Activity in the trailing `window` ending at `current`. While the run is
    /// younger than the window this is the cumulative view.
    pub fn window(&self, current: &MetricSnapshot, window: Duration) -> MetricSnapshot {
        let now = current.elapsed();
        if now <= window {
            return current.clone();
        }
        let horizon = now - window;

        let baseline = self
            .entries
            .iter()
            .rev()
            .find(|s| s.elapsed() <= horizon)
            .or_else(|| self.entries.front());

        match baseline {
            Some(base) => current.delta_since(base),
            None => current.clone(),
        }
    }
}
