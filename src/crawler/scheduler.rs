//! Worker pool supervision
//!
//! The scheduler owns a fixed number of worker slots. It:
//! - spawns one worker task per slot into a `JoinSet`
//! - watches worker heartbeats and replaces a worker whose fetch has run
//!   past the stall timeout
//! - reaps and replaces panicked workers
//! - writes periodic checkpoints
//! - turns stop requests into a closed frontier
//!
//! The run ends once every worker has returned, which happens when the
//! frontier is drained or closed.

use crate::crawler::checkpointer::Checkpointer;
use crate::crawler::shutdown::StopSignal;
use crate::crawler::worker::{run_worker, SharedStatus, WorkerContext, WorkerStatus};
use crate::frontier::Outcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, Id, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Failure reason recorded for a lease whose worker was replaced
pub const WORKER_STALLED: &str = "worker stalled";
pub const WORKER_PANICKED: &str = "worker panicked";

#[derive(Debug, Clone)]
pub(crate) struct SchedulerSettings {
    pub workers: usize,
    pub health_check_interval: Duration,
    pub stall_timeout: Duration,
    /// `None` disables periodic checkpoints
    pub checkpoint_interval: Option<Duration>,
}

struct Slot {
    status: SharedStatus,
    handle: Option<AbortHandle>,
    stalled: bool,
}

pub(crate) struct Scheduler {
    ctx: Arc<WorkerContext>,
    settings: SchedulerSettings,
    checkpointer: Option<Arc<Checkpointer>>,
    stop: watch::Receiver<StopSignal>,
    set: JoinSet<()>,
    slots: Vec<Slot>,
    tasks: HashMap<Id, usize>,
}

impl Scheduler {
    pub fn new(
        ctx: Arc<WorkerContext>,
        settings: SchedulerSettings,
        checkpointer: Option<Arc<Checkpointer>>,
    ) -> Self {
        let stop = ctx.stop.clone();
        Self {
            ctx,
            settings,
            checkpointer,
            stop,
            set: JoinSet::new(),
            slots: Vec::new(),
            tasks: HashMap::new(),
        }
    }

    fn spawn(&mut self, slot: usize) {
        let status: SharedStatus = Arc::new(Mutex::new(WorkerStatus::new()));
        let ctx = Arc::clone(&self.ctx);
        let worker_status = Arc::clone(&status);
        let handle = self.set.spawn(run_worker(slot, ctx, worker_status));
        self.tasks.insert(handle.id(), slot);

        let entry = Slot {
            status,
            handle: Some(handle),
            stalled: false,
        };
        if slot < self.slots.len() {
            self.slots[slot] = entry;
        } else {
            self.slots.push(entry);
        }
    }

    /// Runs workers until the frontier is drained or closed
    pub async fn run(mut self) {
        let workers = self.settings.workers.max(1);
        tracing::info!("Starting {} workers", workers);
        for slot in 0..workers {
            self.spawn(slot);
        }

        let start = Instant::now();
        let mut health = tokio::time::interval_at(
            start + self.settings.health_check_interval,
            self.settings.health_check_interval,
        );
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let checkpoint_period = self
            .settings
            .checkpoint_interval
            .filter(|_| self.checkpointer.is_some());
        let mut checkpoints = checkpoint_period.map(|period| {
            let mut interval = tokio::time::interval_at(start + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let mut stop_seen = StopSignal::Running;
        self.apply_stop(&mut stop_seen);

        loop {
            tokio::select! {
                joined = self.set.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, ()))) => {
                        self.tasks.remove(&id);
                    }
                    Some(Err(error)) => {
                        let id = error.id();
                        let panicked = error.is_panic();
                        self.reap(id, panicked);
                    }
                },
                _ = health.tick() => self.check_health(),
                _ = async {
                    match checkpoints.as_mut() {
                        Some(interval) => interval.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Some(checkpointer) = &self.checkpointer {
                        checkpointer.save().await;
                    }
                }
                changed = self.stop.changed(), if stop_seen != StopSignal::Abort => {
                    if changed.is_ok() {
                        self.apply_stop(&mut stop_seen);
                    } else {
                        stop_seen = StopSignal::Abort;
                    }
                }
            }
        }

        let stats = self.ctx.frontier.stats();
        tracing::debug!(
            "All workers finished ({} queued, {} deferred)",
            stats.queued,
            stats.deferred
        );
    }

    fn apply_stop(&mut self, seen: &mut StopSignal) {
        let signal = *self.stop.borrow_and_update();
        if signal == *seen {
            return;
        }
        *seen = signal;
        match signal {
            StopSignal::Running => {}
            StopSignal::Graceful => {
                tracing::info!("Graceful shutdown requested, draining in-flight fetches");
                self.ctx.frontier.close();
            }
            StopSignal::Abort => {
                tracing::info!("Abort requested, cancelling in-flight fetches");
                self.ctx.frontier.close();
            }
        }
    }

    /// Aborts workers whose current fetch has outlived the stall timeout
    fn check_health(&mut self) {
        let now = Instant::now();
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if entry.stalled {
                continue;
            }
            let status = entry.status.lock().unwrap_or_else(|e| e.into_inner());
            let Some(active) = status.current.as_ref() else {
                continue;
            };
            let running = now.saturating_duration_since(active.started_at);
            if running < self.settings.stall_timeout {
                continue;
            }
            tracing::warn!(
                "Worker {} stalled for {:?} on {}, replacing it",
                slot,
                running,
                active.lease.entry.url()
            );
            drop(status);
            if let Some(handle) = &entry.handle {
                handle.abort();
                entry.stalled = true;
            }
        }
    }

    /// Recovers the lease of a worker that was aborted or panicked, then
    /// spawns a replacement in its slot
    fn reap(&mut self, id: Id, panicked: bool) {
        let Some(slot) = self.tasks.remove(&id) else {
            return;
        };
        let entry = &mut self.slots[slot];
        entry.handle = None;
        let stalled = entry.stalled;
        let current = entry
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current
            .take();

        let reason = if panicked { WORKER_PANICKED } else { WORKER_STALLED };
        if panicked {
            tracing::error!("Worker {} panicked", slot);
        } else if !stalled {
            tracing::debug!("Worker {} cancelled", slot);
        }

        if let Some(active) = current {
            let completed = self
                .ctx
                .frontier
                .complete(active.lease.entry.url(), Outcome::Failed(reason.to_string()));
            if completed && active.holds_slot {
                self.ctx.registry.release(&active.domain);
            }
        }

        self.spawn(slot);
    }
}
