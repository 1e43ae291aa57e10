use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::histogram::HistogramData;
use crate::metrics::GaugeHandle;
use crate::shard::{Series, Shard, default_shard_count};
use crate::snapshot::{MetricSeries, MetricSnapshot, MetricValue};
use crate::{MetricKind, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u32);

impl MetricId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct MetricDef {
    pub id: MetricId,
    pub name: Arc<str>,
    pub kind: MetricKind,
    gauge: Option<GaugeHandle>,
}

#[derive(Debug, Default)]
struct Catalog {
    defs: Vec<MetricDef>,
    by_name: AHashMap<Arc<str>, MetricId>,
}

/// Named metric set backed by independently locked shards.
///
/// A [`Registry::record`] call locks exactly one shard, so every sample of a
/// batch becomes visible to [`Registry::snapshot`] together.
#[derive(Debug)]
pub struct Registry {
    catalog: RwLock<Catalog>,
    shards: Box<[Shard]>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(default_shard_count())
    }
}

impl Registry {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Shard::default()).collect();
        Self {
            catalog: RwLock::new(Catalog::default()),
            shards,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Registers `name` or returns its existing id. Re-registering with a
    /// different kind is an error.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        let mut catalog = self.catalog.write();
        if let Some(&id) = catalog.by_name.get(name) {
            let existing = catalog.defs[id.index()].kind;
            if existing != kind {
                return Err(Error::AlreadyRegistered {
                    name: name.to_string(),
                    existing,
                });
            }
            return Ok(id);
        }

        let id = MetricId(catalog.defs.len() as u32);
        let name: Arc<str> = Arc::from(name);
        catalog.defs.push(MetricDef {
            id,
            name: name.clone(),
            kind,
            gauge: (kind == MetricKind::Gauge).then(GaugeHandle::default),
        });
        catalog.by_name.insert(name, id);

        // Shards are extended while the catalog write lock is held, so every
        // shard always has a slot for every registered id.
        for shard in self.shards.iter() {
            shard.series.lock().push(Series::new(kind));
        }

        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<MetricDef> {
        let catalog = self.catalog.read();
        let id = catalog.by_name.get(name)?;
        catalog.defs.get(id.index()).cloned()
    }

    pub fn definitions(&self) -> Vec<MetricDef> {
        self.catalog.read().defs.clone()
    }

    pub fn gauge(&self, id: MetricId) -> Result<GaugeHandle> {
        let catalog = self.catalog.read();
        let def = catalog
            .defs
            .get(id.index())
            .ok_or(Error::UnknownMetric(id.0))?;
        def.gauge.clone().ok_or_else(|| Error::KindMismatch {
            name: def.name.to_string(),
            expected: MetricKind::Gauge,
            actual: def.kind,
        })
    }

    /// Applies all `samples` under a single shard lock. The batch is validated
    /// first and rejected as a whole on the first bad sample.
    pub fn record(&self, shard: usize, samples: &[Sample]) -> Result<()> {
        let shard = &self.shards[shard % self.shards.len()];
        let mut series = shard.series.lock();

        for s in samples {
            let slot = series
                .get(s.metric.index())
                .ok_or(Error::UnknownMetric(s.metric.0))?;
            let expected = s.value.kind();
            if slot.kind() != expected {
                let actual = slot.kind();
                drop(series);
                return Err(Error::KindMismatch {
                    name: self.name_of(s.metric),
                    expected,
                    actual,
                });
            }
        }

        for s in samples {
            series[s.metric.index()].apply(s.value);
        }
        Ok(())
    }

    /// Merges every shard into a point-in-time snapshot. Shards are locked one
    /// at a time; writers on other shards keep running.
    pub fn snapshot(&self, elapsed: Duration) -> MetricSnapshot {
        let defs = self.definitions();
        let mut merged: Vec<Series> = defs.iter().map(|d| Series::new(d.kind)).collect();

        for shard in self.shards.iter() {
            let series = shard.series.lock();
            for (acc, s) in merged.iter_mut().zip(series.iter()) {
                acc.merge_from(s);
            }
        }

        let series = defs
            .into_iter()
            .zip(merged)
            .map(|(def, acc)| {
                let value = match (acc, &def.gauge) {
                    (Series::Counter(v), _) => MetricValue::Counter(v),
                    (Series::Rate { total, hits }, _) => MetricValue::Rate { total, hits },
                    (Series::Histogram(h), _) => {
                        MetricValue::Histogram(HistogramData::from_histogram(h))
                    }
                    (Series::Gauge, Some(g)) => MetricValue::Gauge {
                        value: g.get(),
                        peak: g.peak(),
                    },
                    (Series::Gauge, None) => MetricValue::Gauge { value: 0, peak: 0 },
                };
                MetricSeries {
                    name: def.name,
                    kind: def.kind,
                    value,
                }
            })
            .collect();

        MetricSnapshot::new(elapsed, series)
    }

    fn name_of(&self, id: MetricId) -> String {
        self.catalog
            .read()
            .defs
            .get(id.index())
            .map(|d| d.name.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleValue;

    fn must<T>(r: Result<T>) -> T {
        match r {
            Ok(v) => v,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn register_is_idempotent_and_rejects_kind_change() {
        let r = Registry::new(2);
        let a = must(r.register("http_reqs", MetricKind::Counter));
        let b = must(r.register("http_reqs", MetricKind::Counter));
        assert_eq!(a, b);

        match r.register("http_reqs", MetricKind::Rate) {
            Err(Error::AlreadyRegistered { existing, .. }) => {
                assert_eq!(existing, MetricKind::Counter)
            }
            other => panic!("expected AlreadyRegistered, got {other:?}"),
        }
    }

    #[test]
    fn bad_sample_rejects_whole_batch() {
        let r = Registry::new(1);
        let reqs = must(r.register("http_reqs", MetricKind::Counter));
        let failed = must(r.register("http_req_failed", MetricKind::Rate));

        let batch = [
            Sample::count(reqs, 1),
            Sample {
                metric: failed,
                value: SampleValue::Micros(5),
            },
        ];
        assert!(matches!(
            r.record(0, &batch),
            Err(Error::KindMismatch { .. })
        ));

        let snap = r.snapshot(Duration::ZERO);
        assert_eq!(snap.counter("http_reqs"), Some(0));
    }

    #[test]
    fn gauges_are_not_recordable_through_batches() {
        let r = Registry::new(1);
        let vus = must(r.register("vus", MetricKind::Gauge));
        assert!(r.record(0, &[Sample::count(vus, 1)]).is_err());

        let g = must(r.gauge(vus));
        g.add(4);
        g.add(-1);
        match r.snapshot(Duration::ZERO).get("vus").map(|s| &s.value) {
            Some(MetricValue::Gauge { value, peak }) => {
                assert_eq!(*value, 3);
                assert_eq!(*peak, 4);
            }
            other => panic!("unexpected gauge value: {other:?}"),
        }
    }

    #[test]
    fn snapshot_merges_all_shards() {
        let r = Registry::new(4);
        let reqs = must(r.register("http_reqs", MetricKind::Counter));
        let dur = must(r.register("http_req_duration", MetricKind::Histogram));

        for shard in 0..8 {
            must(r.record(
                shard,
                &[Sample::count(reqs, 1), Sample::micros(dur, 1_000)],
            ));
        }

        let snap = r.snapshot(Duration::from_secs(1));
        assert_eq!(snap.counter("http_reqs"), Some(8));
        let h = snap
            .histogram("http_req_duration")
            .unwrap_or_else(|| panic!("missing histogram"));
        assert_eq!(h.count(), 8);
    }

    #[test]
    fn registering_after_writes_keeps_shards_aligned() {
        let r = Registry::new(2);
        let reqs = must(r.register("http_reqs", MetricKind::Counter));
        must(r.record(1, &[Sample::count(reqs, 2)]));

        let checks = must(r.register("checks", MetricKind::Rate));
        must(r.record(1, &[Sample::hit(checks, true), Sample::count(reqs, 1)]));

        let snap = r.snapshot(Duration::ZERO);
        assert_eq!(snap.counter("http_reqs"), Some(3));
        assert_eq!(snap.rate("checks"), Some((1, 1)));
    }
}
