//! Recording deployment backend for tests.

use std::sync::{Mutex, MutexGuard};

use greenlight_core::{BoxFuture, DeploymentRevision, Environment, WeightSplit};

use crate::backend::DeploymentBackend;
use crate::error::BackendError;

/// One call made against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Stage { env: Environment, image: String },
    ApplyWeights(WeightSplit),
    Teardown(Environment),
}

#[derive(Default)]
struct Faults {
    stage: Option<String>,
    /// Fail `apply_weights` once the target weight reaches this value.
    weights_at: Option<(Environment, u8)>,
}

/// Backend that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    faults: Mutex<Faults>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` fail with `reason`.
    pub fn fail_stage(self, reason: &str) -> Self {
        lock(&self.faults).stage = Some(reason.to_string());
        self
    }

    /// Make `apply_weights` fail when `env` would reach `weight`.
    pub fn fail_weights_at(self, env: Environment, weight: u8) -> Self {
        lock(&self.faults).weights_at = Some((env, weight));
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Every split passed to `apply_weights`, in order.
    pub fn applied_splits(&self) -> Vec<WeightSplit> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                BackendCall::ApplyWeights(split) => Some(*split),
                _ => None,
            })
            .collect()
    }

    pub fn torn_down(&self) -> Vec<Environment> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                BackendCall::Teardown(env) => Some(*env),
                _ => None,
            })
            .collect()
    }
}

impl DeploymentBackend for RecordingBackend {
    fn stage<'a>(
        &'a self,
        env: Environment,
        revision: &'a DeploymentRevision,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        lock(&self.calls).push(BackendCall::Stage {
            env,
            image: revision.image.to_string(),
        });
        let fault = lock(&self.faults).stage.clone();
        Box::pin(async move {
            match fault {
                Some(reason) => Err(BackendError::new("stage", reason)),
                None => Ok(()),
            }
        })
    }

    fn apply_weights(&self, split: WeightSplit) -> BoxFuture<'_, Result<(), BackendError>> {
        lock(&self.calls).push(BackendCall::ApplyWeights(split));
        let failing = lock(&self.faults)
            .weights_at
            .is_some_and(|(env, weight)| split.weight_of(env) == weight);
        Box::pin(async move {
            if failing {
                Err(BackendError::new("apply_weights", "load balancer rejected update"))
            } else {
                Ok(())
            }
        })
    }

    fn teardown(&self, env: Environment) -> BoxFuture<'_, Result<(), BackendError>> {
        lock(&self.calls).push(BackendCall::Teardown(env));
        Box::pin(async { Ok(()) })
    }
}
