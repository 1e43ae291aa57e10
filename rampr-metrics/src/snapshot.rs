use std::sync::Arc;
use std::time::Duration;

use crate::MetricKind;
use crate::histogram::HistogramData;

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge { value: i64, peak: i64 },
    Rate { total: u64, hits: u64 },
    Histogram(HistogramData),
}

impl MetricValue {
    /// Fraction of hits for rate metrics, `None` before the first observation.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Self::Rate { total, hits } if *total > 0 => Some(*hits as f64 / *total as f64),
            _ => None,
        }
    }

    fn delta_since(&self, older: &MetricValue) -> MetricValue {
        match (self, older) {
            (Self::Counter(now), Self::Counter(then)) => Self::Counter(now.saturating_sub(*then)),
            (
                Self::Rate { total, hits },
                Self::Rate {
                    total: t0,
                    hits: h0,
                },
            ) => Self::Rate {
                total: total.saturating_sub(*t0),
                hits: hits.saturating_sub(*h0),
            },
            (Self::Histogram(now), Self::Histogram(then)) => {
                Self::Histogram(now.delta_since(then))
            }
            _ => self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub name: Arc<str>,
    pub kind: MetricKind,
    pub value: MetricValue,
}

/// Read-only, merged view of every registered metric at one instant.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    elapsed: Duration,
    series: Vec<MetricSeries>,
}

impl MetricSnapshot {
    pub(crate) fn new(elapsed: Duration, mut series: Vec<MetricSeries>) -> Self {
        series.sort_by(|a, b| a.name.cmp(&b.name));
        Self { elapsed, series }
    }

    /// Time covered by this snapshot: run time for cumulative snapshots, the
    /// window length for deltas.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSeries> {
        self.series.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.series
            .binary_search_by(|s| (*s.name).cmp(name))
            .ok()
            .map(|i| &self.series[i])
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.get(name)?.value {
            MetricValue::Counter(v) => Some(v),
            _ => None,
        }
    }

    /// `(hits, total)` for a rate metric.
    pub fn rate(&self, name: &str) -> Option<(u64, u64)> {
        match self.get(name)?.value {
            MetricValue::Rate { total, hits } => Some((hits, total)),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str) -> Option<(i64, i64)> {
        match self.get(name)?.value {
            MetricValue::Gauge { value, peak } => Some((value, peak)),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str) -> Option<&HistogramData> {
        match &self.get(name)?.value {
            MetricValue::Histogram(h) => Some(h),
            _ => None,
        }
    }

    /// Activity between `older` and `self`. Gauges keep their current value;
    /// metrics unknown to `older` are reported cumulatively.
    pub fn delta_since(&self, older: &MetricSnapshot) -> MetricSnapshot {
        let series = self
            .series
            .iter()
            .map(|s| {
                let value = match older.get(&s.name) {
                    Some(prev) => s.value.delta_since(&prev.value),
                    None => s.value.clone(),
                };
                MetricSeries {
                    name: s.name.clone(),
                    kind: s.kind,
                    value,
                }
            })
            .collect();

        Self {
            elapsed: self.elapsed.saturating_sub(older.elapsed),
            series,
        }
    }
}
