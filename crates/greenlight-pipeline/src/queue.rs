//! Trigger intake and the FIFO run queue.
//!
//! Triggers are deduplicated by idempotency key before they are queued.
//! The key, the `Queued` run and its queue position are committed to the
//! store together, and the single worker drains the store-backed queue one
//! run at a time in arrival order. A trigger that was acknowledged is
//! therefore always executed, even across a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{error, info, warn};

use greenlight_core::{RunId, SourceTrigger, epoch_millis};
use greenlight_state::{Enqueued, PipelineRun, RunStatus, StateStore};

use crate::engine::PipelineEngine;
use crate::error::{PipelineError, PipelineResult};

/// Back-off after the worker fails to read the queue.
const STORE_RETRY: Duration = Duration::from_secs(1);

/// Outcome of submitting a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new run was queued.
    Accepted(RunId),
    /// The idempotency key was seen before; this names the existing run.
    Duplicate(RunId),
}

impl Submission {
    pub fn run_id(&self) -> &str {
        match self {
            Submission::Accepted(id) | Submission::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Submission::Duplicate(_))
    }
}

/// Create a connected queue and worker.
///
/// `capacity` bounds the number of runs waiting behind the active one.
/// Submissions beyond it are rejected with [`PipelineError::QueueFull`]
/// and leave no trace, so the sender can retry with the same key.
pub fn channel(
    store: StateStore,
    engine: Arc<PipelineEngine>,
    capacity: usize,
) -> (TriggerQueue, PipelineWorker) {
    let wake = Arc::new(Notify::new());
    let queue = TriggerQueue {
        store: store.clone(),
        wake: wake.clone(),
        capacity: capacity.max(1),
    };
    (queue, PipelineWorker { engine, store, wake })
}

/// Accepts triggers. Cheap to clone.
#[derive(Clone)]
pub struct TriggerQueue {
    store: StateStore,
    wake: Arc<Notify>,
    capacity: usize,
}

impl TriggerQueue {
    /// Validate, deduplicate and enqueue a trigger.
    ///
    /// Never suspends: once the store commit returns, the run is queued
    /// whether or not the caller is still waiting for the answer.
    pub async fn submit(&self, trigger: SourceTrigger) -> PipelineResult<Submission> {
        trigger.validate()?;
        let run = PipelineRun::queued(trigger, epoch_millis());

        match self
            .store
            .enqueue_run(&run.trigger.idempotency_key, &run, self.capacity)?
        {
            Enqueued::Queued => {
                self.wake.notify_one();
                info!(run_id = %run.id, revision = %run.trigger.revision, "trigger accepted");
                Ok(Submission::Accepted(run.id))
            }
            Enqueued::Duplicate(existing) => {
                info!(key = %run.trigger.idempotency_key, run_id = %existing, "duplicate trigger ignored");
                Ok(Submission::Duplicate(existing))
            }
            Enqueued::Full => {
                warn!(key = %run.trigger.idempotency_key, capacity = self.capacity, "trigger queue full");
                Err(PipelineError::QueueFull(self.capacity))
            }
        }
    }

    /// Reconcile runs left behind by a previous process.
    ///
    /// Runs caught `Running` are marked failed at the stage that was
    /// interrupted; runs still `Queued` stay in the pending queue. Call
    /// before the worker is started. Returns the number of pending runs.
    pub fn recover(&self) -> PipelineResult<usize> {
        for mut run in self.store.list_runs()? {
            if run.status != RunStatus::Running {
                continue;
            }
            run.abandon("interrupted by restart", epoch_millis());
            self.store.put_run(&run)?;
            warn!(run_id = %run.id, "interrupted run marked failed");
        }

        let pending = self.store.pending_len()?;
        if pending > 0 {
            info!(pending, "queued runs recovered");
            self.wake.notify_one();
        }
        Ok(pending)
    }
}

/// Drains the queue, one run at a time.
pub struct PipelineWorker {
    engine: Arc<PipelineEngine>,
    store: StateStore,
    wake: Arc<Notify>,
}

impl PipelineWorker {
    /// Process runs until shutdown.
    ///
    /// A run in progress is finished before shutdown is observed. Its queue
    /// entry is removed only after it settles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("pipeline worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle_for = match self.store.next_pending() {
                Ok(Some((seq, run_id))) => {
                    match self.engine.run_queued(&run_id).await {
                        Ok(run) => info!(%run_id, status = ?run.status, "run settled"),
                        Err(e) => error!(%run_id, error = %e, "pipeline run aborted"),
                    }
                    if let Err(e) = self.store.remove_pending(seq) {
                        error!(%run_id, error = %e, "failed to dequeue settled run");
                    }
                    continue;
                }
                Ok(None) => None,
                Err(e) => {
                    error!(error = %e, "failed to read the run queue");
                    Some(STORE_RETRY)
                }
            };

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = self.wake.notified() => {}
                () = pause(idle_for) => {}
            }
        }
        info!("pipeline worker stopped");
    }
}

async fn pause(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_core::StageName;
    use greenlight_state::StageResult;

    use crate::testing::Harness;

    fn trigger(revision: &str, key: &str) -> SourceTrigger {
        SourceTrigger::new(revision, key).unwrap()
    }

    async fn wait_for_status(store: &StateStore, run_id: &str, status: RunStatus) -> PipelineRun {
        loop {
            if let Some(run) = store.get_run(run_id).unwrap() {
                if run.status == status {
                    return run;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replayed_key_is_a_duplicate() {
        let harness = Harness::new();
        let (queue, _worker) = channel(harness.store.clone(), harness.engine.clone(), 8);

        let first = queue.submit(trigger("r1", "delivery-1")).await.unwrap();
        let second = queue.submit(trigger("r1", "delivery-1")).await.unwrap();

        assert!(!first.is_duplicate());
        assert_eq!(second, Submission::Duplicate(first.run_id().to_string()));
        assert_eq!(harness.store.list_runs().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_trigger_is_rejected_before_claiming() {
        let harness = Harness::new();
        let (queue, _worker) = channel(harness.store.clone(), harness.engine.clone(), 8);

        let bad = SourceTrigger {
            revision: String::new(),
            idempotency_key: "delivery-1".to_string(),
            repository: None,
        };
        assert!(matches!(queue.submit(bad).await, Err(PipelineError::Trigger(_))));
        assert!(harness.store.get_trigger("delivery-1").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn worker_runs_triggers_in_arrival_order() {
        let harness = Harness::new();
        let (queue, worker) = channel(harness.store.clone(), harness.engine.clone(), 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        let a = queue.submit(trigger("r1", "delivery-a")).await.unwrap();
        let b = queue.submit(trigger("r2", "delivery-b")).await.unwrap();

        let second = wait_for_status(&harness.store, b.run_id(), RunStatus::Succeeded).await;
        let first = harness.store.get_run(a.run_id()).unwrap().unwrap();
        assert_eq!(first.status, RunStatus::Succeeded);

        let first_done = first.updated_at;
        let second_start = second.stages[0].started_at;
        assert!(second_start >= first_done);
        assert_eq!(harness.builder.calls(), 2);

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_rejects_without_burning_the_key() {
        let harness = Harness::new();
        let (queue, worker) = channel(harness.store.clone(), harness.engine.clone(), 1);

        let a = queue.submit(trigger("r1", "delivery-a")).await.unwrap();
        let rejected = queue.submit(trigger("r2", "delivery-b")).await;
        assert!(matches!(rejected, Err(PipelineError::QueueFull(1))));
        assert!(harness.store.get_trigger("delivery-b").unwrap().is_none());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        wait_for_status(&harness.store, a.run_id(), RunStatus::Succeeded).await;

        // The sender's retry with the same key is a fresh run, not a duplicate.
        let b = queue.submit(trigger("r2", "delivery-b")).await.unwrap();
        assert!(matches!(b, Submission::Accepted(_)));
        wait_for_status(&harness.store, b.run_id(), RunStatus::Succeeded).await;

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_still_runs() {
        let harness = Harness::new();
        let (queue, worker) = channel(harness.store.clone(), harness.engine.clone(), 8);

        // The caller gives up before looking at the answer.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            queue.submit(trigger("r1", "delivery-a")),
        );
        drop(abandoned.await);

        let run_id = harness.store.get_trigger("delivery-a").unwrap().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        wait_for_status(&harness.store, &run_id, RunStatus::Succeeded).await;
        assert_eq!(harness.store.pending_len().unwrap(), 0);

        let replay = queue.submit(trigger("r1", "delivery-a")).await.unwrap();
        assert_eq!(replay, Submission::Duplicate(run_id));

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn recover_fails_interrupted_runs_and_keeps_queued_ones() {
        let harness = Harness::new();
        let (queue, worker) = channel(harness.store.clone(), harness.engine.clone(), 8);

        let waiting = PipelineRun::queued(trigger("r1", "delivery-q"), 1);
        harness.store.enqueue_run("delivery-q", &waiting, 8).unwrap();

        let mut interrupted = PipelineRun::queued(trigger("r2", "delivery-i"), 2);
        interrupted.status = RunStatus::Running;
        interrupted.stages.push(StageResult::succeeded(StageName::Source, Vec::new(), 2, 3));
        harness.store.put_run(&interrupted).unwrap();

        assert_eq!(queue.recover().unwrap(), 1);
        let failed = harness.store.get_run(&interrupted.id).unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.failure(), Some((StageName::Test, "interrupted by restart")));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        wait_for_status(&harness.store, &waiting.id, RunStatus::Succeeded).await;
        assert_eq!(harness.builder.calls(), 1);

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }
}
