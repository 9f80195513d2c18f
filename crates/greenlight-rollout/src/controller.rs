//! Traffic shift controller. Drives the rollout state machine.
//!
//! The controller owns the only handle that can mutate the target model.
//! It runs one rollout at a time as a single task: staging, health results,
//! shift ticks and cancellation requests are all turned into
//! [`RolloutEvent`]s and fed to the machine one by one. Commands the
//! machine returns are carried out before the next event is taken.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use greenlight_core::{
    BoxFuture, DeploymentRevision, Environment, Event, EventBus, HealthVerdict, RolloutReport,
    RolloutStatus, RunId, epoch_millis,
};
use greenlight_health::{HealthMonitor, ReadinessGate, check_with_timeout, wait_until_ready};

use crate::backend::DeploymentBackend;
use crate::config::ShiftConfig;
use crate::environment::TargetModel;
use crate::error::{RolloutError, RolloutResult};
use crate::machine::{Rollout, RolloutCommand, RolloutEvent};

/// Runs blue/green rollouts against one target model.
pub struct TrafficShiftController {
    config: ShiftConfig,
    targets: TargetModel,
    monitor: Arc<dyn HealthMonitor>,
    backend: Arc<dyn DeploymentBackend>,
    events: EventBus,
    slot: Mutex<Slot>,
    /// Cancellation generation. Bumped only while `slot` is locked.
    cancel: watch::Sender<u64>,
}

#[derive(Default)]
struct Slot {
    run: Option<RunId>,
    /// Set by `shutdown`; no rollout starts afterwards.
    closed: bool,
}

/// Clears the active run slot when the rollout ends or is dropped.
struct ActiveRun<'a> {
    slot: &'a Mutex<Slot>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        lock(self.slot).run = None;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TrafficShiftController {
    pub fn new(
        config: ShiftConfig,
        targets: TargetModel,
        monitor: Arc<dyn HealthMonitor>,
        backend: Arc<dyn DeploymentBackend>,
        events: EventBus,
    ) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            config,
            targets,
            monitor,
            backend,
            events,
            slot: Mutex::new(Slot::default()),
            cancel,
        }
    }

    pub fn config(&self) -> &ShiftConfig {
        &self.config
    }

    /// Read-only view of the target model.
    pub fn targets(&self) -> &TargetModel {
        &self.targets
    }

    /// Run id of the rollout in flight, if any.
    pub fn active_run(&self) -> Option<RunId> {
        lock(&self.slot).run.clone()
    }

    /// Ask the in-flight rollout to stop. Returns false if none is running.
    pub fn cancel_active(&self) -> bool {
        let slot = lock(&self.slot);
        let Some(run_id) = slot.run.as_ref() else {
            return false;
        };
        info!(%run_id, "rollout cancellation requested");
        self.cancel.send_modify(|generation| *generation += 1);
        true
    }

    /// Stop accepting rollouts and cancel the one in flight, if any.
    ///
    /// Every later [`run`](Self::run) fails with
    /// [`RolloutError::ShuttingDown`]. Returns true if a rollout was
    /// cancelled.
    pub fn shutdown(&self) -> bool {
        let mut slot = lock(&self.slot);
        slot.closed = true;
        match slot.run.as_ref() {
            Some(run_id) => {
                info!(%run_id, "shutting down, cancelling rollout in flight");
                self.cancel.send_modify(|generation| *generation += 1);
                true
            }
            None => {
                info!("shutting down, no rollout in flight");
                false
            }
        }
    }

    /// Roll `revision` out into the idle environment.
    ///
    /// Every terminal outcome, including rollback and failure, is returned
    /// as `Ok(report)`. Errors mean the rollout never started.
    pub async fn run(&self, revision: &DeploymentRevision) -> RolloutResult<RolloutReport> {
        let (_active, mut cancel_rx) = self.claim(&revision.run_id)?;
        let started_at = epoch_millis();

        let mut machine = Rollout::new(
            &revision.run_id,
            &revision.image.to_string(),
            self.targets.active_environment(),
            &self.config,
        );
        info!(
            run_id = %revision.run_id,
            image = %revision.image,
            from = %machine.original_active(),
            to = %machine.target(),
            increment = self.config.increment_percent(),
            interval_ms = self.config.interval().as_millis() as u64,
            "rollout started"
        );
        self.emit_transition(&machine, None);

        let mut staging = Some(self.staging(revision, machine.target()));
        let mut health: Option<BoxFuture<'static, HealthVerdict>> = None;
        let mut ticker: Option<Interval> = None;
        let mut queue = VecDeque::new();
        let mut cleanup_errors = Vec::new();

        loop {
            while let Some(event) = queue.pop_front() {
                let before = machine.status();
                for command in machine.handle(event) {
                    let outcome = self
                        .execute(command, &mut health, &mut cleanup_errors)
                        .await;
                    if let Some(event) = outcome {
                        queue.push_back(event);
                        break;
                    }
                }

                if machine.status() != before {
                    if machine.status() == RolloutStatus::Shifting {
                        ticker = Some(self.ticker());
                    }
                    if !machine.status().is_terminal() {
                        self.emit_transition(&machine, None);
                    }
                }
            }

            if machine.status().is_terminal() {
                break;
            }

            let event = tokio::select! {
                Ok(()) = cancel_rx.changed() => RolloutEvent::Cancel,
                event = next_ready(&mut staging) => {
                    staging = None;
                    event
                }
                verdict = next_ready(&mut health) => {
                    health = None;
                    RolloutEvent::Health(verdict)
                }
                () = next_tick(&mut ticker) => RolloutEvent::Tick,
            };
            queue.push_back(event);
        }

        let mut report = machine.report(self.targets.snapshot().split(), started_at, epoch_millis());
        if !cleanup_errors.is_empty() {
            let cleanup = cleanup_errors.join("; ");
            report.reason = Some(match report.reason.take() {
                Some(reason) => format!("{reason}; {cleanup}"),
                None => cleanup,
            });
        }
        self.emit_transition(&machine, Some(&report));
        Ok(report)
    }

    /// Take the run slot together with a cancellation receiver. Both happen
    /// under the slot lock, so any cancel that can see this run is observed.
    fn claim(&self, run_id: &str) -> RolloutResult<(ActiveRun<'_>, watch::Receiver<u64>)> {
        let mut slot = lock(&self.slot);
        if slot.closed {
            return Err(RolloutError::ShuttingDown);
        }
        if let Some(existing) = slot.run.as_ref() {
            return Err(RolloutError::AlreadyInProgress(existing.clone()));
        }
        let cancel_rx = self.cancel.subscribe();
        slot.run = Some(run_id.to_string());
        Ok((ActiveRun { slot: &self.slot }, cancel_rx))
    }

    fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Stage the revision and wait for readiness, as one event.
    fn staging(&self, revision: &DeploymentRevision, target: Environment) -> BoxFuture<'static, RolloutEvent> {
        let backend = Arc::clone(&self.backend);
        let monitor = Arc::clone(&self.monitor);
        let revision = revision.clone();
        let gate = ReadinessGate {
            poll_interval: self.config.readiness_poll_interval(),
            deadline: self.config.staging_timeout(),
            check_timeout: self.config.health_check_timeout(),
        };
        Box::pin(async move {
            if let Err(e) = backend.stage(target, &revision).await {
                return RolloutEvent::StagingFailed(e.to_string());
            }
            match wait_until_ready(monitor.as_ref(), target, &gate).await {
                Ok(_) => RolloutEvent::Ready,
                Err(e) => RolloutEvent::StagingFailed(e.to_string()),
            }
        })
    }

    /// Carry out one command. A returned event is fed back to the machine
    /// and the rest of the batch is skipped.
    async fn execute(
        &self,
        command: RolloutCommand,
        health: &mut Option<BoxFuture<'static, HealthVerdict>>,
        cleanup_errors: &mut Vec<String>,
    ) -> Option<RolloutEvent> {
        match command {
            RolloutCommand::ApplyWeights(split) => match self.backend.apply_weights(split).await {
                Ok(()) => {
                    let idle = self.targets.idle_environment();
                    self.targets.set_idle_weight(split.weight_of(idle));
                    debug!(environment = %idle, weight = split.weight_of(idle), "weights applied");
                    None
                }
                Err(e) => {
                    error!(error = %e, %split, "failed to apply weights");
                    Some(RolloutEvent::InfrastructureError(e.to_string()))
                }
            },
            RolloutCommand::CheckHealth(env) => {
                let monitor = Arc::clone(&self.monitor);
                let timeout = self.config.health_check_timeout();
                *health = Some(Box::pin(async move {
                    check_with_timeout(monitor.as_ref(), env, timeout).await
                }));
                None
            }
            RolloutCommand::RestoreWeights(split) => {
                if let Err(e) = self.backend.apply_weights(split).await {
                    error!(error = %e, %split, "failed to restore weights");
                    cleanup_errors.push(e.to_string());
                }
                self.targets.restore();
                *health = None;
                None
            }
            RolloutCommand::SwapActive => {
                if self.targets.swap_active_environment().is_none() {
                    error!(targets = ?self.targets.snapshot(), "swap refused, idle environment not at 100");
                    cleanup_errors.push("swap refused".to_string());
                }
                None
            }
            RolloutCommand::Teardown(env) => {
                if let Err(e) = self.backend.teardown(env).await {
                    error!(error = %e, environment = %env, "teardown failed");
                    cleanup_errors.push(e.to_string());
                }
                None
            }
        }
    }

    fn emit_transition(&self, machine: &Rollout, report: Option<&RolloutReport>) {
        let status = machine.status();
        let outcome = match status {
            RolloutStatus::Staging | RolloutStatus::Shifting => "entered",
            RolloutStatus::Completed => "succeeded",
            RolloutStatus::RolledBack => "rolled_back",
            RolloutStatus::Failed => "failed",
        };
        let detail = match report {
            Some(report) => report.summary(),
            None => format!("{} {}", machine.target(), self.targets.snapshot().split()),
        };
        self.events
            .emit(Event::rollout(machine.run_id(), status, outcome).with_detail(detail));
    }
}

async fn next_ready<T>(future: &mut Option<BoxFuture<'static, T>>) -> T {
    match future {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
