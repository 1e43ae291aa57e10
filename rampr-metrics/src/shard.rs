use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::histogram::new_default_histogram;
use crate::{MetricKind, SampleValue};

/// Per-shard accumulator for one metric. Gauges live outside the shards, so
/// their slot only keeps metric ids aligned.
#[derive(Debug, Clone)]
pub(crate) enum Series {
    Counter(u64),
    Rate { total: u64, hits: u64 },
    Histogram(Histogram<u64>),
    Gauge,
}

impl Series {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(0),
            MetricKind::Rate => Self::Rate { total: 0, hits: 0 },
            MetricKind::Histogram => Self::Histogram(new_default_histogram()),
            MetricKind::Gauge => Self::Gauge,
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Gauge => MetricKind::Gauge,
        }
    }

    #[inline]
    pub(crate) fn apply(&mut self, value: SampleValue) {
        match (self, value) {
            (Self::Counter(c), SampleValue::Count(v)) => *c = c.saturating_add(v),
            (Self::Rate { total, hits }, SampleValue::Hit(hit)) => {
                *total = total.saturating_add(1);
                if hit {
                    *hits = hits.saturating_add(1);
                }
            }
            (Self::Histogram(h), SampleValue::Micros(us)) => h.saturating_record(us),
            _ => {}
        }
    }

    pub(crate) fn merge_from(&mut self, other: &Series) {
        match (self, other) {
            (Self::Counter(a), Self::Counter(b)) => *a = a.saturating_add(*b),
            (
                Self::Rate { total, hits },
                Self::Rate {
                    total: t2,
                    hits: h2,
                },
            ) => {
                *total = total.saturating_add(*t2);
                *hits = hits.saturating_add(*h2);
            }
            (Self::Histogram(a), Self::Histogram(b)) => {
                // Both sides share the same bounds, so this cannot fail.
                let _ = a.add(b);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shard {
    pub(crate) series: Mutex<Vec<Series>>,
}

pub(crate) fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .saturating_mul(2)
        .clamp(1, 64)
}
