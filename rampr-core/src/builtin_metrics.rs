use std::time::Duration;

use rampr_metrics::{GaugeHandle, MetricId, MetricKind, Registry, Sample};
use smallvec::SmallVec;

use crate::Result;
use crate::outcome::ExecutedRequest;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const CHECKS: &str = "checks";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

pub(crate) type SampleBatch = SmallVec<[Sample; 8]>;

/// Ids of the metrics every run records.
#[derive(Debug, Clone)]
pub struct BuiltinMetrics {
    pub http_reqs: MetricId,
    pub http_req_failed: MetricId,
    pub http_req_duration: MetricId,
    pub iterations: MetricId,
    pub iteration_duration: MetricId,
    pub data_sent: MetricId,
    pub data_received: MetricId,
    pub checks: MetricId,
    pub vus: GaugeHandle,
    pub vus_max: GaugeHandle,
}

impl BuiltinMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let vus = registry.register(VUS, MetricKind::Gauge)?;
        let vus_max = registry.register(VUS_MAX, MetricKind::Gauge)?;

        Ok(Self {
            http_reqs: registry.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_failed: registry.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            http_req_duration: registry.register(HTTP_REQ_DURATION, MetricKind::Histogram)?,
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Histogram)?,
            data_sent: registry.register(DATA_SENT, MetricKind::Counter)?,
            data_received: registry.register(DATA_RECEIVED, MetricKind::Counter)?,
            checks: registry.register(CHECKS, MetricKind::Rate)?,
            vus: registry.gauge(vus)?,
            vus_max: registry.gauge(vus_max)?,
        })
    }

    /// Everything one request contributes, recorded as a single batch.
    pub(crate) fn request_samples(&self, executed: &ExecutedRequest) -> SampleBatch {
        let o = &executed.outcome;
        let mut batch: SampleBatch = SmallVec::new();
        batch.push(Sample::count(self.http_reqs, 1));
        batch.push(Sample::hit(self.http_req_failed, !o.success));
        batch.push(Sample::micros(self.http_req_duration, o.duration_micros));
        if o.bytes_sent > 0 {
            batch.push(Sample::count(self.data_sent, o.bytes_sent));
        }
        if o.bytes_received > 0 {
            batch.push(Sample::count(self.data_received, o.bytes_received));
        }
        batch.extend(
            executed
                .checks
                .iter()
                .map(|passed| Sample::hit(self.checks, *passed)),
        );
        batch
    }

    pub(crate) fn iteration_samples(&self, duration: Duration) -> [Sample; 2] {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        [
            Sample::count(self.iterations, 1),
            Sample::micros(self.iteration_duration, micros),
        ]
    }
}
