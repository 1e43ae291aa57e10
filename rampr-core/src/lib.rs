//! Staged HTTP load generation.
//!
//! A [`RunController`] ramps a pool of virtual users along a piecewise-linear
//! stage curve, feeds every request outcome into a sharded
//! [`rampr_metrics::Registry`] and evaluates thresholds while the run is live
//! and once more at the end.

mod builtin_metrics;
mod config;
mod controller;
mod env;
mod error;
mod executor;
mod outcome;
mod pool;
mod progress;
mod report;
mod request;
mod schedule;
mod state;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use builtin_metrics::{
    BuiltinMetrics, CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
    HTTP_REQS, ITERATION_DURATION, ITERATIONS, VUS, VUS_MAX,
};
pub use config::{EngineOptions, Stage, TestConfig, ThresholdSpec};
pub use controller::{RunControls, RunController, RunHandle, start};
pub use env::{EnvVars, env_vars, lookup as lookup_env, resolve_url};
pub use error::{Error, Result};
pub use executor::RequestExecutor;
pub use outcome::{ExecutedRequest, FailureKind, RequestOutcome};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, StageProgress};
pub use report::{AbortReason, RunReport};
pub use request::{
    CheckCondition, CheckSpec, DEFAULT_REQUEST_TIMEOUT, IterationContext, RequestBuilder,
    RequestTemplate, StaticRequest, StatusPredicate,
};
pub use schedule::{RampSchedule, StageSnapshot};
pub use state::RunState;
pub use thresholds::{ThresholdAgg, ThresholdExpr, ThresholdOp, parse_threshold_expr};
pub use thresholds_eval::{SnapshotHistory, ThresholdEvaluator, ThresholdResult, ThresholdStatus};
