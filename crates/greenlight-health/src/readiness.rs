//! Readiness gate for a freshly staged environment.
//!
//! After the new revision is staged into the idle environment it must
//! report `Healthy` before any traffic moves. The gate polls the monitor
//! on a fixed interval until that happens or the staging deadline passes.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use greenlight_core::{Environment, HealthVerdict};

use crate::monitor::{HealthMonitor, check_with_timeout};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("{environment} not ready after {waited_ms}ms ({polls} polls, last verdict: {last})")]
    TimedOut {
        environment: Environment,
        waited_ms: u64,
        polls: u32,
        last: HealthVerdict,
    },
}

/// Polling parameters for the readiness wait.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    pub poll_interval: Duration,
    /// Total time allowed for the environment to become ready.
    pub deadline: Duration,
    /// Bound on each individual check.
    pub check_timeout: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `env` until it reports `Healthy`. Returns the number of polls made.
pub async fn wait_until_ready(
    monitor: &dyn HealthMonitor,
    env: Environment,
    gate: &ReadinessGate,
) -> Result<u32, ReadinessError> {
    let started = Instant::now();
    let deadline = started + gate.deadline;
    let mut polls = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let verdict = if remaining.is_zero() {
            HealthVerdict::Unreachable
        } else {
            polls += 1;
            check_with_timeout(monitor, env, gate.check_timeout.min(remaining)).await
        };

        if verdict == HealthVerdict::Healthy {
            info!(environment = %env, polls, "environment ready");
            return Ok(polls);
        }

        let now = Instant::now();
        if now + gate.poll_interval >= deadline || remaining.is_zero() {
            return Err(ReadinessError::TimedOut {
                environment: env,
                waited_ms: now.duration_since(started).as_millis() as u64,
                polls,
                last: verdict,
            });
        }

        debug!(environment = %env, %verdict, polls, "not ready yet");
        tokio::time::sleep(gate.poll_interval).await;
    }
}
