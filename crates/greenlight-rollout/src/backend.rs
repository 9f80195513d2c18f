//! Deployment backend: the infrastructure that actually runs environments.
//!
//! The controller decides *what* the fleet should look like; a backend makes
//! it so. `CommandBackend` delegates each operation to a shell hook from the
//! `[backend]` section of `greenlight.toml`. An operation with no hook
//! configured is a no-op, which suits fleets where the load balancer is
//! driven by something else watching the target model.

use std::time::Duration;

use tracing::{debug, info};

use greenlight_core::config::BackendConfig;
use greenlight_core::{BoxFuture, DeploymentRevision, Environment, WeightSplit, run_shell};

use crate::error::BackendError;

/// Infrastructure operations the traffic shift controller needs.
pub trait DeploymentBackend: Send + Sync {
    /// Deploy `revision` into `env` at weight 0.
    fn stage<'a>(
        &'a self,
        env: Environment,
        revision: &'a DeploymentRevision,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Route traffic according to `split`.
    fn apply_weights(&self, split: WeightSplit) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Remove whatever was staged into `env`.
    fn teardown(&self, env: Environment) -> BoxFuture<'_, Result<(), BackendError>>;
}

/// Backend driven by operator-supplied shell hooks.
#[derive(Debug, Clone, Default)]
pub struct CommandBackend {
    stage_command: Option<String>,
    weights_command: Option<String>,
    teardown_command: Option<String>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn from_config(config: &BackendConfig, timeout: Duration) -> Self {
        Self {
            stage_command: config.stage_command.clone(),
            weights_command: config.weights_command.clone(),
            teardown_command: config.teardown_command.clone(),
            timeout,
        }
    }

    async fn run_hook(
        &self,
        operation: &'static str,
        command: Option<&str>,
        envs: &[(&str, String)],
    ) -> Result<(), BackendError> {
        let Some(command) = command else {
            debug!(operation, "no hook configured, skipping");
            return Ok(());
        };
        let output = run_shell(command, envs, self.timeout)
            .await
            .map_err(|e| BackendError::new(operation, e.to_string()))?;
        if !output.success {
            return Err(BackendError::new(operation, output.failure_summary()));
        }
        Ok(())
    }
}

impl DeploymentBackend for CommandBackend {
    fn stage<'a>(
        &'a self,
        env: Environment,
        revision: &'a DeploymentRevision,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            info!(environment = %env, image = %revision.image, "staging revision");
            let envs = [
                ("GREENLIGHT_ENVIRONMENT", env.as_str().to_string()),
                ("GREENLIGHT_IMAGE", revision.image.to_string()),
                ("GREENLIGHT_PORT", revision.descriptor.container_port.to_string()),
                ("GREENLIGHT_CONTAINER", revision.descriptor.container_name.clone()),
                ("GREENLIGHT_RUN_ID", revision.run_id.clone()),
            ];
            self.run_hook("stage", self.stage_command.as_deref(), &envs).await
        })
    }

    fn apply_weights(&self, split: WeightSplit) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            let envs = [
                ("GREENLIGHT_BLUE_WEIGHT", split.blue.to_string()),
                ("GREENLIGHT_GREEN_WEIGHT", split.green.to_string()),
            ];
            self.run_hook("apply_weights", self.weights_command.as_deref(), &envs)
                .await
        })
    }

    fn teardown(&self, env: Environment) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            let envs = [("GREENLIGHT_ENVIRONMENT", env.as_str().to_string())];
            self.run_hook("teardown", self.teardown_command.as_deref(), &envs)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(weights: &str) -> CommandBackend {
        CommandBackend::from_config(
            &BackendConfig {
                stage_command: None,
                weights_command: Some(weights.to_string()),
                teardown_command: Some("exit 7".to_string()),
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn weights_hook_sees_split() {
        let backend = backend("test \"$GREENLIGHT_BLUE_WEIGHT/$GREENLIGHT_GREEN_WEIGHT\" = 70/30");
        backend
            .apply_weights(WeightSplit { blue: 70, green: 30 })
            .await
            .unwrap();
        let err = backend
            .apply_weights(WeightSplit { blue: 60, green: 40 })
            .await
            .unwrap_err();
        assert_eq!(err.operation, "apply_weights");
    }

    #[tokio::test]
    async fn failing_hook_surfaces_exit_code() {
        let err = backend("true").teardown(Environment::Green).await.unwrap_err();
        assert_eq!(err.operation, "teardown");
        assert!(err.reason.contains("exit 7"));
    }
}
