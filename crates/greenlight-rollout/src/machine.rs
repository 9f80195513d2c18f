//! Rollout state machine.
//!
//! `Rollout` is a pure value: it consumes one [`RolloutEvent`] at a time
//! and returns the [`RolloutCommand`]s the driver must carry out. It never
//! sleeps, never performs I/O, and never sees two events at once, so the
//! race between a tick, a late health result, and a cancellation request
//! is settled by the order in which the driver queues them.
//!
//! ```text
//! Staging ──Ready──▶ Shifting ──Healthy@100──▶ Completed
//!    │                  │
//!    │                  ├─Unhealthy / Cancel──▶ RolledBack
//!    │                  └─Unreachable / infra─▶ Failed (reversed)
//!    └─timeout / error / cancel──▶ Failed (idle torn down)
//! ```

use tracing::{debug, info, warn};

use greenlight_core::{
    Environment, FailingCheck, HealthVerdict, RolloutReport, RolloutStatus, RunId, WeightSplit,
};

use crate::config::ShiftConfig;

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    /// The staged environment reported ready.
    Ready,
    /// Staging did not finish: readiness deadline passed or the backend
    /// could not stage the revision.
    StagingFailed(String),
    /// Shift cadence timer fired.
    Tick,
    /// Answer to the last `CheckHealth` command.
    Health(HealthVerdict),
    /// Operator asked to abandon the rollout.
    Cancel,
    /// A backend hook failed while shifting.
    InfrastructureError(String),
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutCommand {
    /// Move traffic forward to this split.
    ApplyWeights(WeightSplit),
    /// Ask the health monitor about an environment.
    CheckHealth(Environment),
    /// Reverse every shift at once, back to this split.
    RestoreWeights(WeightSplit),
    /// Promote the target environment to active.
    SwapActive,
    /// Discard whatever was staged into an environment.
    Teardown(Environment),
}

/// An in-progress traffic shift.
#[derive(Debug, Clone)]
pub struct Rollout {
    run_id: RunId,
    image: String,
    original_active: Environment,
    target: Environment,
    increment: u8,
    status: RolloutStatus,
    weight: u8,
    peak_weight: u8,
    shift_count: u32,
    awaiting_health: bool,
    failing_check: Option<FailingCheck>,
    reason: Option<String>,
}

impl Rollout {
    /// Start staging `image` into the environment opposite `active`.
    pub fn new(run_id: &str, image: &str, active: Environment, config: &ShiftConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            image: image.to_string(),
            original_active: active,
            target: active.other(),
            increment: config.increment_percent(),
            status: RolloutStatus::Staging,
            weight: 0,
            peak_weight: 0,
            shift_count: 0,
            awaiting_health: false,
            failing_check: None,
            reason: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RolloutStatus {
        self.status
    }

    pub fn target(&self) -> Environment {
        self.target
    }

    pub fn original_active(&self) -> Environment {
        self.original_active
    }

    /// Weight currently routed to the target.
    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn shift_count(&self) -> u32 {
        self.shift_count
    }

    pub fn split(&self) -> WeightSplit {
        WeightSplit::toward(self.target, self.weight)
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Apply one event.
    pub fn handle(&mut self, event: RolloutEvent) -> Vec<RolloutCommand> {
        if self.status.is_terminal() {
            debug!(run_id = %self.run_id, ?event, "event after terminal state ignored");
            return Vec::new();
        }

        match (self.status, event) {
            (RolloutStatus::Staging, RolloutEvent::Ready) => {
                self.status = RolloutStatus::Shifting;
                info!(run_id = %self.run_id, environment = %self.target, "staged revision ready, shifting");
                Vec::new()
            }
            (RolloutStatus::Staging, RolloutEvent::StagingFailed(reason))
            | (RolloutStatus::Staging, RolloutEvent::InfrastructureError(reason)) => {
                self.fail_staging(reason)
            }
            (RolloutStatus::Staging, RolloutEvent::Cancel) => {
                self.fail_staging("cancelled during staging".to_string())
            }
            (RolloutStatus::Staging, event) => {
                debug!(run_id = %self.run_id, ?event, "ignored while staging");
                Vec::new()
            }

            (RolloutStatus::Shifting, RolloutEvent::Tick) => self.advance(),
            (RolloutStatus::Shifting, RolloutEvent::Health(verdict)) => self.on_health(verdict),
            (RolloutStatus::Shifting, RolloutEvent::Cancel) => {
                self.reason = Some(format!("cancelled at {}%", self.weight));
                self.reverse(RolloutStatus::RolledBack)
            }
            (RolloutStatus::Shifting, RolloutEvent::InfrastructureError(reason)) => {
                self.reason = Some(reason);
                self.reverse(RolloutStatus::Failed)
            }
            (RolloutStatus::Shifting, event) => {
                debug!(run_id = %self.run_id, ?event, "ignored while shifting");
                Vec::new()
            }

            (_, _) => Vec::new(),
        }
    }

    /// Terminal summary. `final_split` is what the target model shows after
    /// the driver has applied every command.
    pub fn report(&self, final_split: WeightSplit, started_at: u64, finished_at: u64) -> RolloutReport {
        RolloutReport {
            run_id: self.run_id.clone(),
            image: self.image.clone(),
            target: self.target,
            original_active: self.original_active,
            status: self.status,
            peak_weight: self.peak_weight,
            final_split,
            shift_count: self.shift_count,
            failing_check: self.failing_check,
            reason: self.reason.clone(),
            started_at,
            finished_at,
        }
    }

    fn advance(&mut self) -> Vec<RolloutCommand> {
        if self.awaiting_health {
            debug!(run_id = %self.run_id, weight = self.weight, "tick while awaiting health, skipped");
            return Vec::new();
        }
        self.weight = self.weight.saturating_add(self.increment).min(100);
        self.peak_weight = self.weight;
        self.shift_count += 1;
        self.awaiting_health = true;
        debug!(
            run_id = %self.run_id,
            environment = %self.target,
            weight = self.weight,
            shift = self.shift_count,
            "shifting traffic"
        );
        vec![
            RolloutCommand::ApplyWeights(self.split()),
            RolloutCommand::CheckHealth(self.target),
        ]
    }

    fn on_health(&mut self, verdict: HealthVerdict) -> Vec<RolloutCommand> {
        if !self.awaiting_health {
            debug!(run_id = %self.run_id, %verdict, "unsolicited health result ignored");
            return Vec::new();
        }
        self.awaiting_health = false;

        match verdict {
            HealthVerdict::Healthy if self.weight >= 100 => {
                self.status = RolloutStatus::Completed;
                info!(run_id = %self.run_id, environment = %self.target, "rollout completed");
                vec![RolloutCommand::SwapActive]
            }
            HealthVerdict::Healthy => Vec::new(),
            HealthVerdict::Unhealthy => {
                self.record_failing_check(verdict);
                self.reverse(RolloutStatus::RolledBack)
            }
            HealthVerdict::Unreachable => {
                self.record_failing_check(verdict);
                self.reason = Some("health monitor unavailable".to_string());
                self.reverse(RolloutStatus::Failed)
            }
        }
    }

    fn record_failing_check(&mut self, verdict: HealthVerdict) {
        self.failing_check = Some(FailingCheck {
            environment: self.target,
            verdict,
            at_weight: self.weight,
        });
    }

    /// One-step reversal to the original split, then discard the target.
    fn reverse(&mut self, status: RolloutStatus) -> Vec<RolloutCommand> {
        warn!(
            run_id = %self.run_id,
            environment = %self.target,
            weight = self.weight,
            status = %status,
            "reversing traffic shift"
        );
        self.weight = 0;
        self.awaiting_health = false;
        self.status = status;
        vec![
            RolloutCommand::RestoreWeights(WeightSplit::toward(self.original_active, 100)),
            RolloutCommand::Teardown(self.target),
        ]
    }

    fn fail_staging(&mut self, reason: String) -> Vec<RolloutCommand> {
        warn!(run_id = %self.run_id, environment = %self.target, %reason, "staging failed");
        self.reason = Some(reason);
        self.status = RolloutStatus::Failed;
        vec![RolloutCommand::Teardown(self.target)]
    }
}
