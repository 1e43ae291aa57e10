use crate::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown metric id {0}")]
    UnknownMetric(u32),

    #[error("metric `{name}` is already registered as a {existing} metric")]
    AlreadyRegistered { name: String, existing: MetricKind },

    #[error("metric `{name}` is a {actual} metric, expected {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },
}
