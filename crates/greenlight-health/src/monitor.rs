//! Health monitor seam used by the rollout controller.
//!
//! A `HealthMonitor` answers one question: is this environment healthy
//! right now? Callers bound every check with `check_with_timeout`, so a
//! monitor that never answers is reported as `Unreachable`.

use std::time::Duration;

use tracing::{debug, warn};

use greenlight_core::config::HealthConfig;
use greenlight_core::{BoxFuture, Environment, HealthVerdict};

use crate::checker::http_probe;

/// Source of health verdicts for the two environments.
pub trait HealthMonitor: Send + Sync {
    /// Check one environment. Implementations may take arbitrarily long;
    /// callers bound the wait.
    fn check_health(&self, env: Environment) -> BoxFuture<'_, HealthVerdict>;
}

/// Run a health check, treating a missed deadline as `Unreachable`.
pub async fn check_with_timeout(
    monitor: &dyn HealthMonitor,
    env: Environment,
    timeout: Duration,
) -> HealthVerdict {
    match tokio::time::timeout(timeout, monitor.check_health(env)).await {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(environment = %env, timeout_ms = timeout.as_millis() as u64, "health check timed out");
            HealthVerdict::Unreachable
        }
    }
}

/// Monitor that probes each environment's HTTP health endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthMonitor {
    blue: Option<String>,
    green: Option<String>,
    path: String,
    probe_timeout: Duration,
}

impl HttpHealthMonitor {
    pub fn new(blue: Option<String>, green: Option<String>, path: impl Into<String>) -> Self {
        Self {
            blue,
            green,
            path: path.into(),
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Build from the `[health]` section of `greenlight.toml`.
    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(config.blue.clone(), config.green.clone(), config.path.clone())
    }

    /// Per-probe transport timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn address(&self, env: Environment) -> Option<&str> {
        match env {
            Environment::Blue => self.blue.as_deref(),
            Environment::Green => self.green.as_deref(),
        }
    }
}

impl HealthMonitor for HttpHealthMonitor {
    fn check_health(&self, env: Environment) -> BoxFuture<'_, HealthVerdict> {
        Box::pin(async move {
            let Some(address) = self.address(env) else {
                debug!(environment = %env, "no health address configured");
                return HealthVerdict::Unreachable;
            };
            let verdict = HealthVerdict::from(http_probe(address, &self.path, self.probe_timeout).await);
            debug!(environment = %env, %address, %verdict, "health probe finished");
            verdict
        })
    }
}
