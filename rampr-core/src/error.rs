pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("`stages` must add up to a duration greater than zero")]
    EmptyRun,

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid status predicate `{0}` (expected e.g. `200`, `200-399` or `200,204`)")]
    InvalidStatusPredicate(String),

    #[error("`{0}` must be a positive duration")]
    InvalidInterval(&'static str),

    #[error("threshold on `{metric}` cannot be evaluated: {reason}")]
    ThresholdUnresolvable { metric: String, reason: String },

    #[error("metrics error: {0}")]
    Metrics(#[from] rampr_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Errors that are detected before any VU starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidStages
                | Self::EmptyRun
                | Self::InvalidThreshold { .. }
                | Self::InvalidRequest(_)
                | Self::InvalidStatusPredicate(_)
                | Self::InvalidInterval(_)
        )
    }
}
