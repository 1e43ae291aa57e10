use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rampr_metrics::{GaugeHandle, Registry};
use tokio_util::sync::CancellationToken;

use crate::builtin_metrics::BuiltinMetrics;
use crate::executor::RequestExecutor;
use crate::request::{IterationContext, RequestBuilder};

/// Raised once by any worker that hits an unrecoverable error; the controller
/// aborts the run when it fires.
#[derive(Debug, Clone, Default)]
pub(crate) struct FatalSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl FatalSignal {
    pub(crate) fn raise(&self, reason: String) {
        let mut slot = self.reason.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.token.cancel();
    }

    pub(crate) async fn raised(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// State shared by every VU of a run.
pub(crate) struct VuShared {
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: BuiltinMetrics,
    pub(crate) executor: RequestExecutor,
    pub(crate) builder: Arc<dyn RequestBuilder>,
    pub(crate) sleep: Duration,
    pub(crate) started: Instant,
    pub(crate) fatal: FatalSignal,
}

/// Counts a VU in the `vus` gauge for as long as it is alive. Dropping it,
/// whether the worker returns or its task is aborted, decrements exactly once.
pub(crate) struct ActiveVuGuard {
    gauge: GaugeHandle,
}

impl ActiveVuGuard {
    pub(crate) fn new(gauge: &GaugeHandle) -> Self {
        gauge.add(1);
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.gauge.add(-1);
    }
}

pub(crate) struct VuWorker {
    pub(crate) vu_id: u64,
    pub(crate) shared: Arc<VuShared>,
    pub(crate) retire: CancellationToken,
    pub(crate) kill: CancellationToken,
}

impl VuWorker {
    /// Runs iterations until retired. The retire signal is only observed
    /// between iterations and during the pause, so a request in flight
    /// completes and is recorded. The kill signal cuts the request short; it
    /// is then recorded as aborted and the worker returns.
    pub(crate) async fn run(self, guard: ActiveVuGuard) {
        let _guard = guard;
        let shared = &*self.shared;
        let shard = self.vu_id as usize;
        let mut iteration = 0u64;

        while !self.retire.is_cancelled() {
            let iteration_started = Instant::now();
            let ctx = IterationContext {
                vu_id: self.vu_id,
                iteration,
                elapsed: shared.started.elapsed(),
            };

            let executed = {
                let template = shared.builder.build_request(&ctx);
                shared.executor.execute_until(&template, &self.kill).await
            };

            if let Err(err) = shared
                .registry
                .record(shard, &shared.metrics.request_samples(&executed))
            {
                shared.fatal.raise(format!("vu {}: {err}", self.vu_id));
                return;
            }
            if self.kill.is_cancelled() {
                tracing::debug!(vu = self.vu_id, "vu killed mid-request");
                return;
            }

            if !shared.sleep.is_zero() {
                tokio::select! {
                    _ = self.retire.cancelled() => {}
                    _ = tokio::time::sleep(shared.sleep) => {}
                }
            }

            let samples = shared
                .metrics
                .iteration_samples(iteration_started.elapsed());
            if let Err(err) = shared.registry.record(shard, &samples) {
                shared.fatal.raise(format!("vu {}: {err}", self.vu_id));
                return;
            }
            iteration = iteration.wrapping_add(1);
        }

        tracing::trace!(vu = self.vu_id, iterations = iteration, "vu retired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_decrements_exactly_once() {
        let gauge = GaugeHandle::default();
        let a = ActiveVuGuard::new(&gauge);
        let b = ActiveVuGuard::new(&gauge);
        assert_eq!(gauge.get(), 2);
        drop(a);
        assert_eq!(gauge.get(), 1);
        drop(b);
        assert_eq!(gauge.get(), 0);
        assert_eq!(gauge.peak(), 2);
    }

    #[test]
    fn fatal_signal_keeps_first_reason() {
        let fatal = FatalSignal::default();
        assert!(fatal.reason().is_none());
        fatal.raise("first".to_string());
        fatal.raise("second".to_string());
        assert_eq!(fatal.reason().as_deref(), Some("first"));
    }
}
