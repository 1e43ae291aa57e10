use std::time::Duration;

use crate::request::RequestTemplate;
use crate::thresholds::parse_threshold_expr;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: String,
    pub expression: String,
    /// Evaluate over the trailing window instead of the whole run.
    pub window: Option<Duration>,
    /// Abort the run as soon as this threshold fails.
    pub abort_on_fail: bool,
    /// Ignore failures for abort purposes until this much run time has passed.
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdSpec {
    pub fn new(metric: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expression: expression.into(),
            window: None,
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    #[must_use]
    pub fn abort_on_fail(mut self, delay: Option<Duration>) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// How often the VU pool is reconciled with the ramp curve.
    pub scheduler_tick: Duration,
    /// How often thresholds are evaluated while the run is live.
    pub evaluation_interval: Duration,
    /// Bound on draining in-flight iterations after a natural end or a stop request.
    pub graceful_stop: Duration,
    /// How long in-flight requests may finish after an abort before tasks are killed.
    pub abort_grace: Duration,
    pub metric_shards: Option<usize>,
    pub connect_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            scheduler_tick: Duration::from_secs(1),
            evaluation_interval: Duration::from_secs(1),
            graceful_stop: Duration::from_secs(30),
            abort_grace: Duration::from_secs(5),
            metric_shards: None,
            connect_timeout: Some(Duration::from_secs(3)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestConfig {
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdSpec>,
    pub request: RequestTemplate,
    /// Pause after every iteration.
    pub sleep: Duration,
    pub options: EngineOptions,
}

impl TestConfig {
    pub fn new(stages: Vec<Stage>, request: RequestTemplate) -> Self {
        Self {
            stages,
            thresholds: Vec::new(),
            request,
            sleep: Duration::ZERO,
            options: EngineOptions::default(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: ThresholdSpec) -> Self {
        self.thresholds.push(threshold);
        self
    }

    #[must_use]
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidStages);
        }
        if self.total_duration().is_zero() {
            return Err(Error::EmptyRun);
        }

        for t in &self.thresholds {
            if t.metric.trim().is_empty() {
                return Err(Error::InvalidThreshold {
                    metric: t.metric.clone(),
                    error: "metric name is empty".to_string(),
                });
            }
            parse_threshold_expr(&t.expression).map_err(|error| Error::InvalidThreshold {
                metric: t.metric.clone(),
                error,
            })?;
            if t.window.is_some_and(|w| w.is_zero()) {
                return Err(Error::InvalidThreshold {
                    metric: t.metric.clone(),
                    error: "window must be a positive duration".to_string(),
                });
            }
        }

        self.request.validate()?;

        let o = &self.options;
        if o.scheduler_tick.is_zero() {
            return Err(Error::InvalidInterval("scheduler_tick"));
        }
        if o.evaluation_interval.is_zero() {
            return Err(Error::InvalidInterval("evaluation_interval"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TestConfig {
        TestConfig::new(
            vec![
                Stage::new(Duration::from_secs(10), 5),
                Stage::new(Duration::from_secs(20), 10),
                Stage::new(Duration::from_secs(10), 0),
            ],
            RequestTemplate::get("https://staging.example/api/health"),
        )
        .with_threshold(ThresholdSpec::new("http_req_failed", "rate<0.01"))
        .with_threshold(ThresholdSpec::new("http_req_duration", "p(95)<800"))
        .with_sleep(Duration::from_secs(1))
    }

    #[test]
    fn health_check_profile_is_valid() {
        let c = config();
        assert!(c.validate().is_ok());
        assert_eq!(c.total_duration(), Duration::from_secs(40));
        assert_eq!(c.max_target(), 10);
    }

    #[test]
    fn empty_or_zero_length_stages_are_rejected() {
        let mut c = config();
        c.stages.clear();
        assert!(matches!(c.validate(), Err(Error::InvalidStages)));

        c.stages = vec![Stage::new(Duration::ZERO, 3)];
        assert!(matches!(c.validate(), Err(Error::EmptyRun)));
    }

    #[test]
    fn malformed_threshold_is_a_configuration_error() {
        let c = config().with_threshold(ThresholdSpec::new("http_req_duration", "p95 < 800"));
        match c.validate() {
            Err(err @ Error::InvalidThreshold { .. }) => assert!(err.is_configuration()),
            other => panic!("expected InvalidThreshold, got {other:?}"),
        }
    }

    #[test]
    fn zero_tick_is_rejected() {
        let mut c = config();
        c.options.scheduler_tick = Duration::ZERO;
        assert!(matches!(
            c.validate(),
            Err(Error::InvalidInterval("scheduler_tick"))
        ));
    }
}
