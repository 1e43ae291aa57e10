use hdrhistogram::Histogram;

const MICROS_PER_MILLI: f64 = 1_000.0;

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Latency in microseconds, up to one hour. Three significant digits keep the
    // relative error of any reported value at or below 0.1%.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Merged latency distribution. Stored in microseconds, reported in milliseconds.
#[derive(Debug, Clone)]
pub struct HistogramData {
    inner: Histogram<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl Default for HistogramData {
    fn default() -> Self {
        Self {
            inner: new_default_histogram(),
        }
    }
}

impl HistogramData {
    pub(crate) fn from_histogram(inner: Histogram<u64>) -> Self {
        Self { inner }
    }

    pub fn count(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn min_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| to_ms(self.inner.min()))
    }

    pub fn max_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| to_ms(self.inner.max()))
    }

    pub fn mean_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.inner.mean() / MICROS_PER_MILLI)
    }

    pub fn stdev_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.inner.stdev() / MICROS_PER_MILLI)
    }

    /// Percentile in milliseconds, interpolated linearly between the two
    /// nearest ranks (`rank = p/100 * (n - 1)`).
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        interpolated_percentile(&self.inner, p).map(|v| v / MICROS_PER_MILLI)
    }

    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            count: self.count(),
            min: self.min_ms(),
            max: self.max_ms(),
            mean: self.mean_ms(),
            stdev: self.stdev_ms(),
            med: self.percentile_ms(50.0),
            p90: self.percentile_ms(90.0),
            p95: self.percentile_ms(95.0),
            p99: self.percentile_ms(99.0),
        }
    }

    pub(crate) fn delta_since(&self, older: &HistogramData) -> HistogramData {
        let mut out = self.inner.clone();
        if out.subtract(&older.inner).is_err() {
            // Older data is not a prefix of this one; keep the cumulative view.
            return self.clone();
        }
        Self { inner: out }
    }
}

#[inline]
fn to_ms(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_MILLI
}

pub(crate) fn interpolated_percentile(h: &Histogram<u64>, p: f64) -> Option<f64> {
    let n = h.len();
    if n == 0 || p.is_nan() {
        return None;
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo_rank = rank.floor() as u64;
    let hi_rank = rank.ceil() as u64;
    let frac = rank - lo_rank as f64;

    let mut lo = None;
    let mut hi = None;
    let mut seen = 0u64;
    for v in h.iter_recorded() {
        seen = seen.saturating_add(v.count_at_value());
        let value = h.median_equivalent(v.value_iterated_to()) as f64;
        if lo.is_none() && lo_rank < seen {
            lo = Some(value);
        }
        if hi_rank < seen {
            hi = Some(value);
            break;
        }
    }

    let lo = lo?;
    let hi = hi.unwrap_or(lo);
    Some(lo + (hi - lo) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist_of(values_us: impl IntoIterator<Item = u64>) -> HistogramData {
        let mut h = new_default_histogram();
        for v in values_us {
            h.saturating_record(v);
        }
        HistogramData::from_histogram(h)
    }

    #[test]
    fn empty_histogram_has_no_stats() {
        let h = HistogramData::default();
        let s = h.summary();
        assert_eq!(s.count, 0);
        assert!(s.min.is_none());
        assert!(s.med.is_none());
        assert!(s.p95.is_none());
        assert!(s.mean.is_none());
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        // 1ms, 2ms, 3ms, 4ms: rank for p50 is 1.5 -> 2.5ms.
        let h = hist_of([1_000, 2_000, 3_000, 4_000]);
        let p50 = h.percentile_ms(50.0).unwrap_or_else(|| panic!("p50"));
        assert!((p50 - 2.5).abs() < 0.01, "p50={p50}");

        let p0 = h.percentile_ms(0.0).unwrap_or_else(|| panic!("p0"));
        let p100 = h.percentile_ms(100.0).unwrap_or_else(|| panic!("p100"));
        assert!((p0 - 1.0).abs() < 0.01, "p0={p0}");
        assert!((p100 - 4.0).abs() < 0.01, "p100={p100}");
    }

    #[test]
    fn percentile_of_uniform_spread_is_within_error_bound() {
        // 100 samples spread evenly over 100ms..=1000ms.
        let h = hist_of((0..100u64).map(|i| 100_000 + i * 900_000 / 99));
        let p95 = h.percentile_ms(95.0).unwrap_or_else(|| panic!("p95"));
        let exact = 100.0 + 94.05 * (900.0 / 99.0);
        assert!(
            ((p95 - exact) / exact).abs() <= 0.001,
            "p95={p95} exact={exact}"
        );
    }

    #[test]
    fn single_sample_percentiles_collapse() {
        let h = hist_of([42_000]);
        for p in [0.0, 50.0, 99.9, 100.0] {
            let v = h.percentile_ms(p).unwrap_or_else(|| panic!("p{p}"));
            assert!((v - 42.0).abs() < 0.05, "p{p}={v}");
        }
    }

    #[test]
    fn delta_since_keeps_only_newer_samples() {
        let older = hist_of([1_000, 1_000]);
        let newer = hist_of([1_000, 1_000, 9_000, 9_000]);
        let delta = newer.delta_since(&older);
        assert_eq!(delta.count(), 2);
        let min = delta.min_ms().unwrap_or_else(|| panic!("min"));
        assert!((min - 9.0).abs() < 0.01, "min={min}");
    }
}
