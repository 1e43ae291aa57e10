use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::MetricId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Histogram,
}

/// One observation destined for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub metric: MetricId,
    pub value: SampleValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleValue {
    /// Adds to a counter.
    Count(u64),
    /// Adds one observation to a rate; `true` counts as a hit.
    Hit(bool),
    /// Records a duration in microseconds into a histogram.
    Micros(u64),
}

impl SampleValue {
    pub(crate) fn kind(self) -> MetricKind {
        match self {
            Self::Count(_) => MetricKind::Counter,
            Self::Hit(_) => MetricKind::Rate,
            Self::Micros(_) => MetricKind::Histogram,
        }
    }
}

impl Sample {
    #[inline]
    pub fn count(metric: MetricId, value: u64) -> Self {
        Self {
            metric,
            value: SampleValue::Count(value),
        }
    }

    #[inline]
    pub fn hit(metric: MetricId, hit: bool) -> Self {
        Self {
            metric,
            value: SampleValue::Hit(hit),
        }
    }

    #[inline]
    pub fn micros(metric: MetricId, value: u64) -> Self {
        Self {
            metric,
            value: SampleValue::Micros(value),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GaugeCell {
    value: AtomicI64,
    peak: AtomicI64,
}

/// Lock-free gauge that also tracks the highest value it ever held.
#[derive(Debug, Clone, Default)]
pub struct GaugeHandle(pub(crate) Arc<GaugeCell>);

impl GaugeHandle {
    #[inline]
    pub fn add(&self, delta: i64) {
        let now = self
            .0
            .value
            .fetch_add(delta, Ordering::Relaxed)
            .saturating_add(delta);
        self.bump_peak(now);
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.0.value.store(value, Ordering::Relaxed);
        self.bump_peak(value);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn peak(&self) -> i64 {
        self.0.peak.load(Ordering::Relaxed)
    }

    fn bump_peak(&self, candidate: i64) {
        let mut cur = self.0.peak.load(Ordering::Relaxed);
        while candidate > cur {
            match self.0.peak.compare_exchange_weak(
                cur,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_tracks_peak_across_add_and_set() {
        let g = GaugeHandle::default();
        g.add(3);
        g.add(2);
        g.add(-4);
        assert_eq!(g.get(), 1);
        assert_eq!(g.peak(), 5);

        g.set(7);
        g.set(0);
        assert_eq!(g.get(), 0);
        assert_eq!(g.peak(), 7);
    }

    #[test]
    fn metric_kind_display_is_snake_case() {
        assert_eq!(MetricKind::Histogram.to_string(), "histogram");
        assert_eq!("rate".parse::<MetricKind>().ok(), Some(MetricKind::Rate));
    }
}
