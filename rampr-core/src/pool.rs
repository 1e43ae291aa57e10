use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::vu::{ActiveVuGuard, VuShared, VuWorker};

/// How long killed workers get to record their aborted request before their
/// tasks are dropped.
const KILL_WAIT: Duration = Duration::from_millis(500);

struct VuSlot {
    vu_id: u64,
    retire: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    Done,
    TimedOut,
    Interrupted,
}

/// The set of VU tasks of one run. Only the controller task touches it.
pub(crate) struct VuPool {
    shared: Arc<VuShared>,
    stop: CancellationToken,
    kill: CancellationToken,
    /// Active workers in spawn order; retirement takes from the back.
    active: Vec<VuSlot>,
    /// Retired workers that may still be finishing an iteration.
    retiring: Vec<VuSlot>,
    next_vu_id: u64,
}

impl VuPool {
    pub(crate) fn new(shared: Arc<VuShared>) -> Self {
        Self {
            shared,
            stop: CancellationToken::new(),
            kill: CancellationToken::new(),
            active: Vec::new(),
            retiring: Vec::new(),
            next_vu_id: 1,
        }
    }

    pub(crate) fn active(&self) -> u64 {
        self.active.len() as u64
    }

    /// Spawns or retires workers until `target` are active.
    pub(crate) fn scale_to(&mut self, target: u64) {
        self.retiring.retain(|slot| !slot.handle.is_finished());

        let current = self.active();
        if current < target {
            for _ in current..target {
                self.spawn();
            }
            tracing::debug!(from = current, to = target, "scaled up");
        } else if current > target {
            for _ in target..current {
                if let Some(slot) = self.active.pop() {
                    slot.retire.cancel();
                    self.retiring.push(slot);
                }
            }
            tracing::debug!(from = current, to = target, "scaled down");
        }
    }

    fn spawn(&mut self) {
        let vu_id = self.next_vu_id;
        self.next_vu_id += 1;

        let retire = self.stop.child_token();
        let guard = ActiveVuGuard::new(&self.shared.metrics.vus);
        let worker = VuWorker {
            vu_id,
            shared: self.shared.clone(),
            retire: retire.clone(),
            kill: self.kill.clone(),
        };
        let handle = tokio::spawn(worker.run(guard));

        self.active.push(VuSlot {
            vu_id,
            retire,
            handle,
        });
    }

    /// Signals every worker to stop after its current iteration.
    pub(crate) fn retire_all(&mut self) {
        self.stop.cancel();
        self.retiring.append(&mut self.active);
    }

    /// Waits for retired workers to finish, up to `limit`. Returns early with
    /// [`Drain::Interrupted`] when `interrupt` fires.
    pub(crate) async fn drain(&mut self, limit: Duration, interrupt: &CancellationToken) -> Drain {
        let deadline = Instant::now() + limit;

        while let Some(slot) = self.retiring.last_mut() {
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => return Drain::Interrupted,
                _ = tokio::time::sleep_until(deadline) => return Drain::TimedOut,
                res = &mut slot.handle => {
                    if let Err(err) = res
                        && err.is_panic()
                    {
                        tracing::error!(vu = slot.vu_id, "vu task panicked");
                    }
                }
            }
            self.retiring.pop();
        }
        Drain::Done
    }

    /// Kills every remaining worker and waits for the tasks to finish.
    /// Workers cut their request short and record it as aborted; a task that
    /// does not finish within [`KILL_WAIT`] is aborted outright. Returns how
    /// many were still running.
    pub(crate) async fn kill_all(&mut self) -> usize {
        self.stop.cancel();
        let slots: Vec<VuSlot> = self.active.drain(..).chain(self.retiring.drain(..)).collect();
        let killed = slots.iter().filter(|s| !s.handle.is_finished()).count();
        self.kill.cancel();

        let deadline = Instant::now() + KILL_WAIT;
        for mut slot in slots {
            if tokio::time::timeout_at(deadline, &mut slot.handle)
                .await
                .is_err()
            {
                tracing::warn!(vu = slot.vu_id, "vu ignored kill, aborting its task");
                slot.handle.abort();
                let _ = slot.handle.await;
            }
        }
        killed
    }
}
