use std::sync::Arc;
use std::time::Duration;

use rampr_http::HttpClient;
use rampr_metrics::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::builtin_metrics::BuiltinMetrics;
use crate::config::TestConfig;
use crate::executor::RequestExecutor;
use crate::pool::{Drain, VuPool};
use crate::progress::{LiveTracker, ProgressFn, ProgressUpdate};
use crate::report::{AbortReason, RunReport};
use crate::request::{RequestBuilder, StaticRequest};
use crate::schedule::RampSchedule;
use crate::state::RunState;
use crate::thresholds_eval::{SnapshotHistory, ThresholdEvaluator, ThresholdResult};
use crate::vu::{FatalSignal, VuShared};
use crate::{Error, Result};

/// A validated run, ready to start.
pub struct RunController {
    config: TestConfig,
    evaluator: ThresholdEvaluator,
    registry: Arc<Registry>,
    metrics: BuiltinMetrics,
    builder: Arc<dyn RequestBuilder>,
    progress: Option<ProgressFn>,
}

impl RunController {
    /// Validates `config` and prepares the metric registry. Nothing runs yet.
    pub fn new(config: TestConfig) -> Result<Self> {
        config.validate()?;
        let evaluator = ThresholdEvaluator::compile(&config.thresholds)?;

        let registry = Arc::new(match config.options.metric_shards {
            Some(n) => Registry::new(n),
            None => Registry::default(),
        });
        let metrics = BuiltinMetrics::register(&registry)?;
        let builder: Arc<dyn RequestBuilder> = Arc::new(StaticRequest::new(config.request.clone()));

        Ok(Self {
            config,
            evaluator,
            registry,
            metrics,
            builder,
            progress: None,
        })
    }

    /// Replaces the fixed request template with a per-iteration builder.
    #[must_use]
    pub fn with_request_builder(mut self, builder: Arc<dyn RequestBuilder>) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Evaluates every threshold against the empty registry so that unknown
    /// metrics and inapplicable aggregations surface before any traffic.
    pub fn preflight(&self) -> Result<Vec<ThresholdResult>> {
        let snap = self.registry.snapshot(Duration::ZERO);
        self.evaluator
            .evaluate(&snap, &SnapshotHistory::new(self.evaluator.max_window()))
    }

    /// Spawns the run on the current tokio runtime.
    pub fn start(self) -> RunHandle {
        let controls = RunControls::default();
        let (state_tx, state_rx) = watch::channel(RunState::Pending);
        let task = tokio::spawn(self.drive(controls.clone(), state_tx));

        RunHandle {
            controls,
            state: state_rx,
            task,
        }
    }

    async fn drive(
        self,
        controls: RunControls,
        state_tx: watch::Sender<RunState>,
    ) -> Result<RunReport> {
        let Self {
            config,
            evaluator,
            registry,
            metrics,
            builder,
            progress,
        } = self;
        let options = &config.options;

        let schedule = RampSchedule::new(config.stages.clone());
        let total = schedule.total_duration();
        metrics
            .vus_max
            .set(i64::try_from(schedule.max_target()).unwrap_or(i64::MAX));

        let started = Instant::now();
        let shared = Arc::new(VuShared {
            registry: registry.clone(),
            metrics: metrics.clone(),
            executor: RequestExecutor::new(HttpClient::new(options.connect_timeout)),
            builder,
            sleep: config.sleep,
            started: started.into_std(),
            fatal: FatalSignal::default(),
        });
        let mut pool = VuPool::new(shared.clone());
        let mut state = StateCell(state_tx);

        tracing::info!(
            stages = schedule.stages().len(),
            duration = ?total,
            max_vus = schedule.max_target(),
            thresholds = evaluator.len(),
            "run started"
        );

        let mut ticker = tokio::time::interval(options.scheduler_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let end_at = started + total;

        let mut history = SnapshotHistory::new(evaluator.max_window());
        let mut next_eval = Duration::ZERO;
        let mut live = LiveTracker::default();
        let mut tick: u64 = 0;
        let mut first_pass = true;
        let mut last_emit = started;

        let exit = loop {
            tokio::select! {
                biased;
                _ = controls.abort.cancelled() => break Exit::Abort(AbortReason::Requested),
                _ = controls.stop.cancelled() => break Exit::Stop,
                _ = shared.fatal.raised() => {
                    let reason = shared.fatal.reason().unwrap_or_default();
                    break Exit::Abort(AbortReason::Aggregation(reason));
                }
                _ = tokio::time::sleep_until(end_at) => {}
                _ = ticker.tick() => {}
            }

            let elapsed = started.elapsed();
            if schedule.is_done(elapsed) {
                break Exit::Finished;
            }

            let target = schedule.target_at(elapsed);
            pool.scale_to(target);
            let stage = schedule.stage_snapshot_at(elapsed);
            if let Some(stage) = &stage {
                state.set(RunState::for_stage(stage));
            }

            let due = !evaluator.is_empty() && elapsed >= next_eval;
            if !due && progress.is_none() {
                continue;
            }
            let snap = registry.snapshot(elapsed);

            if due {
                next_eval = elapsed + options.evaluation_interval;
                match evaluator.evaluate(&snap, &history) {
                    Ok(results) => {
                        if let Some(r) = evaluator.abort_trigger(&results, elapsed) {
                            break Exit::Abort(AbortReason::ThresholdBreached {
                                metric: r.metric.clone(),
                                expression: r.expression.clone(),
                            });
                        }
                    }
                    Err(Error::ThresholdUnresolvable { metric, reason }) => {
                        break Exit::Abort(AbortReason::ThresholdUnresolvable { metric, reason });
                    }
                    Err(err) => break Exit::Abort(AbortReason::Aggregation(err.to_string())),
                }
            }

            if let Some(progress) = &progress {
                let metrics_live = live.update(&snap);

                // The first tick fires at t=0; there is nothing to report yet.
                if !std::mem::take(&mut first_pass) {
                    tick += 1;
                    let now = Instant::now();
                    (progress)(ProgressUpdate {
                        tick,
                        elapsed,
                        interval: now.duration_since(last_emit),
                        state: state.get(),
                        target_vus: target,
                        active_vus: pool.active(),
                        live_vus: u64::try_from(metrics.vus.get()).unwrap_or_default(),
                        total_duration: total,
                        stage: stage.map(Into::into),
                        metrics: metrics_live,
                    });
                    last_emit = now;
                }
            }
            history.push(snap);
        };

        state.set(RunState::Stopping);
        let mut abort_reason = match exit {
            Exit::Abort(reason) => {
                tracing::warn!(reason = %reason, "aborting run");
                Some(reason)
            }
            Exit::Stop => {
                tracing::info!("stop requested, draining");
                None
            }
            Exit::Finished => None,
        };

        let forced_terminations = if abort_reason.is_some() {
            shut_down_bounded(&mut pool, options.abort_grace).await
        } else {
            pool.retire_all();
            match pool.drain(options.graceful_stop, &controls.abort).await {
                Drain::Done => 0,
                Drain::TimedOut => {
                    let killed = pool.kill_all().await;
                    tracing::warn!(
                        killed,
                        grace = ?options.graceful_stop,
                        "vus did not finish within graceful stop"
                    );
                    killed
                }
                Drain::Interrupted => {
                    tracing::warn!("abort requested while draining");
                    abort_reason = Some(AbortReason::Requested);
                    shut_down_bounded(&mut pool, options.abort_grace).await
                }
            }
        };

        let elapsed = started.elapsed();
        let snapshot = registry.snapshot(elapsed);
        let thresholds = evaluator.evaluate_final(&snapshot, &history);

        let final_state = if abort_reason.is_some() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        let passed =
            final_state == RunState::Completed && !thresholds.iter().any(ThresholdResult::failed);
        state.set(final_state);

        tracing::info!(
            state = %final_state,
            passed,
            elapsed = ?elapsed,
            forced_terminations,
            "run finished"
        );

        Ok(RunReport {
            state: final_state,
            passed,
            elapsed,
            thresholds,
            metrics: snapshot,
            abort_reason,
            forced_terminations,
        })
    }
}

/// Validates `config` and starts it on the current tokio runtime.
pub fn start(config: TestConfig) -> Result<RunHandle> {
    Ok(RunController::new(config)?.start())
}

enum Exit {
    Finished,
    Stop,
    Abort(AbortReason),
}

/// Retires every worker, gives in-flight requests `grace` to finish and
/// kills whatever is left. Returns how many tasks were killed.
async fn shut_down_bounded(pool: &mut VuPool, grace: Duration) -> usize {
    pool.retire_all();
    match pool.drain(grace, &CancellationToken::new()).await {
        Drain::Done | Drain::Interrupted => 0,
        Drain::TimedOut => {
            let killed = pool.kill_all().await;
            tracing::warn!(killed, grace = ?grace, "killed vus after abort grace");
            killed
        }
    }
}

/// Publishes state changes, ignoring transitions the state machine forbids.
struct StateCell(watch::Sender<RunState>);

impl StateCell {
    fn get(&self) -> RunState {
        *self.0.borrow()
    }

    fn set(&mut self, next: RunState) {
        let current = self.get();
        if !current.can_transition_to(next) {
            return;
        }
        tracing::info!(from = %current, to = %next, "run state changed");
        self.0.send_replace(next);
    }
}

/// Cloneable stop/abort switches for a running test.
#[derive(Debug, Clone, Default)]
pub struct RunControls {
    stop: CancellationToken,
    abort: CancellationToken,
}

impl RunControls {
    /// Graceful stop: no new iterations, in-flight ones finish within
    /// `graceful_stop`.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Bounded stop: workers get `abort_grace` before their tasks are killed.
    pub fn abort(&self) {
        self.abort.cancel();
        self.stop.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct RunHandle {
    controls: RunControls,
    state: watch::Receiver<RunState>,
    task: JoinHandle<Result<RunReport>>,
}

impl RunHandle {
    pub fn controls(&self) -> RunControls {
        self.controls.clone()
    }

    pub fn request_stop(&self) {
        self.controls.request_stop();
    }

    pub fn abort(&self) {
        self.controls.abort();
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    pub async fn wait(self) -> Result<RunReport> {
        self.task.await?
    }
}
