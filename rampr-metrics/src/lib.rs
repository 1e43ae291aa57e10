//! Sharded metric aggregation for load runs.
//!
//! Writers record batches of [`Sample`]s into one shard at a time; readers take
//! merged [`MetricSnapshot`]s. Histogram metrics record microseconds and report
//! milliseconds.

mod agg;
mod error;
mod histogram;
mod metrics;
mod registry;
mod shard;
mod snapshot;

pub use agg::{RunningStats, per_sec};
pub use error::{Error, Result};
pub use histogram::{HistogramData, HistogramSummary};
pub use metrics::{GaugeHandle, MetricKind, Sample, SampleValue};
pub use registry::{MetricDef, MetricId, Registry};
pub use snapshot::{MetricSeries, MetricSnapshot, MetricValue};
