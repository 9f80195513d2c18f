//! Deployment Target Model: the two fixed environments and which one is live.
//!
//! The model holds a single "which is active" indicator plus the weight
//! currently routed to the idle side. Both weights are derived from that
//! pair, so they always sum to 100 and there is no state in which both
//! environments are active or both are idle.
//!
//! Readers get snapshots or a `watch` subscription. Only the traffic shift
//! controller in this crate can mutate the model.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use greenlight_core::{Environment, WeightSplit};

/// Snapshot of the target model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTargets {
    /// Environment serving production.
    pub active: Environment,
    /// Weight currently routed to the idle environment, in [0, 100].
    pub idle_weight: u8,
}

impl DeploymentTargets {
    pub fn steady(active: Environment) -> Self {
        Self {
            active,
            idle_weight: 0,
        }
    }

    pub fn idle(&self) -> Environment {
        self.active.other()
    }

    /// Weights across both environments.
    pub fn split(&self) -> WeightSplit {
        WeightSplit::toward(self.idle(), self.idle_weight)
    }
}

/// Single source of truth for the active environment.
#[derive(Debug, Clone)]
pub struct TargetModel {
    tx: watch::Sender<DeploymentTargets>,
}

impl TargetModel {
    /// A model in steady state with `active` serving all traffic.
    pub fn new(active: Environment) -> Self {
        let (tx, _) = watch::channel(DeploymentTargets::steady(active));
        Self { tx }
    }

    pub fn snapshot(&self) -> DeploymentTargets {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeploymentTargets> {
        self.tx.subscribe()
    }

    pub fn active_environment(&self) -> Environment {
        self.snapshot().active
    }

    pub fn idle_environment(&self) -> Environment {
        self.snapshot().idle()
    }

    /// Route `weight` to the idle environment.
    pub(crate) fn set_idle_weight(&self, weight: u8) {
        self.tx.send_modify(|targets| targets.idle_weight = weight.min(100));
    }

    /// Return all traffic to the active environment.
    pub(crate) fn restore(&self) {
        self.tx.send_modify(|targets| targets.idle_weight = 0);
    }

    /// Promote the idle environment once it carries all traffic.
    ///
    /// Role and weight change in one publish. Returns the new active
    /// environment, or `None` if the idle side is not at 100.
    pub(crate) fn swap_active_environment(&self) -> Option<Environment> {
        let mut promoted = None;
        self.tx.send_if_modified(|targets| {
            if targets.idle_weight != 100 {
                return false;
            }
            *targets = DeploymentTargets::steady(targets.idle());
            promoted = Some(targets.active);
            true
        });
        if let Some(active) = promoted {
            info!(environment = %active, "active environment swapped");
        }
        promoted
    }
}
