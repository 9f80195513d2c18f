//! Build and test collaborators.
//!
//! The toolchain that compiles, tests and packages the service is outside
//! the orchestrator. These traits are the seam; the command-backed
//! implementations run the hooks from the `[build]` section of
//! `greenlight.toml`.

use std::time::Duration;

use tracing::{debug, info};

use greenlight_core::config::BuildConfig;
use greenlight_core::{
    BoxFuture, ImageRef, ShellError, ShellOutput, SourceRef, duration_field, run_shell,
};

use crate::error::StageFailure;

/// Produces a container image for a source revision and pushes it.
pub trait BuildService: Send + Sync {
    fn build<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<ImageRef, StageFailure>>;
}

/// Runs the service's test suite against a source revision.
pub trait TestRunner: Send + Sync {
    fn run_tests<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<(), StageFailure>>;
}

fn hook_env(source: &SourceRef, repository: Option<&str>) -> Vec<(&'static str, String)> {
    let mut envs = vec![
        ("GREENLIGHT_REVISION", source.revision.clone()),
        ("IMAGE_TAG", source.short_revision().to_string()),
    ];
    if let Some(repo) = repository.or(source.repository.as_deref()) {
        envs.push(("REPOSITORY_URI", repo.to_string()));
    }
    envs
}

fn infrastructure(e: ShellError) -> StageFailure {
    StageFailure::Infrastructure(e.to_string())
}

/// Builds by running a shell command that prints the pushed image
/// reference as its last line of output.
#[derive(Debug, Clone)]
pub struct CommandBuildService {
    command: String,
    repository: Option<String>,
    timeout: Duration,
}

impl CommandBuildService {
    pub fn new(command: &str, repository: Option<String>, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            repository,
            timeout,
        }
    }

    /// `None` when no build command is configured.
    pub fn from_config(config: &BuildConfig) -> Result<Option<Self>, greenlight_core::ConfigError> {
        let timeout = duration_field("build.timeout", &config.timeout)?;
        Ok(config
            .build_command
            .as_deref()
            .map(|command| Self::new(command, config.repository.clone(), timeout)))
    }

    fn image_from(output: &ShellOutput) -> Result<ImageRef, StageFailure> {
        let line = output
            .last_line()
            .ok_or_else(|| StageFailure::Build("build command printed no image reference".to_string()))?;
        ImageRef::parse(line).map_err(|e| StageFailure::Build(e.to_string()))
    }
}

impl BuildService for CommandBuildService {
    fn build<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<ImageRef, StageFailure>> {
        Box::pin(async move {
            let envs = hook_env(source, self.repository.as_deref());
            let output = run_shell(&self.command, &envs, self.timeout)
                .await
                .map_err(infrastructure)?;
            if !output.success {
                return Err(StageFailure::Build(output.failure_summary()));
            }
            let image = Self::image_from(&output)?;
            info!(revision = %source.revision, %image, "image built");
            Ok(image)
        })
    }
}

/// Runs a shell test command; a non-zero exit is a test failure.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: String,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            timeout,
        }
    }

    /// `None` when no test command is configured.
    pub fn from_config(config: &BuildConfig) -> Result<Option<Self>, greenlight_core::ConfigError> {
        let timeout = duration_field("build.timeout", &config.timeout)?;
        Ok(config
            .test_command
            .as_deref()
            .map(|command| Self::new(command, timeout)))
    }
}

impl TestRunner for CommandTestRunner {
    fn run_tests<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<(), StageFailure>> {
        Box::pin(async move {
            let envs = hook_env(source, None);
            let output = run_shell(&self.command, &envs, self.timeout)
                .await
                .map_err(infrastructure)?;
            if !output.success {
                return Err(StageFailure::Test(output.failure_summary()));
            }
            debug!(revision = %source.revision, "tests passed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> SourceRef {
        SourceRef {
            revision: "main@0123456789abcdef".to_string(),
            repository: None,
        }
    }

    #[tokio::test]
    async fn build_reads_image_from_last_line() {
        let service = CommandBuildService::new(
            "echo compiling; echo \"$REPOSITORY_URI:$IMAGE_TAG\"",
            Some("registry.example.com/frontend".to_string()),
            Duration::from_secs(5),
        );
        let image = service.build(&trigger()).await.unwrap();
        assert_eq!(image.to_string(), "registry.example.com/frontend:0123456789ab");
    }

    #[tokio::test]
    async fn build_nonzero_exit_is_build_failure() {
        let service = CommandBuildService::new("echo 'syntax error' >&2; exit 2", None, Duration::from_secs(5));
        let err = service.build(&trigger()).await.unwrap_err();
        assert!(matches!(err, StageFailure::Build(ref m) if m.contains("syntax error")));
    }

    #[tokio::test]
    async fn build_with_garbage_output_is_build_failure() {
        let service = CommandBuildService::new("echo 'NOT AN IMAGE!'", None, Duration::from_secs(5));
        assert!(matches!(
            service.build(&trigger()).await,
            Err(StageFailure::Build(_))
        ));
    }

    #[tokio::test]
    async fn build_timeout_is_infrastructure() {
        let service = CommandBuildService::new("sleep 5", None, Duration::from_millis(50));
        assert!(matches!(
            service.build(&trigger()).await,
            Err(StageFailure::Infrastructure(_))
        ));
    }

    #[tokio::test]
    async fn failing_tests_are_test_failures() {
        let runner = CommandTestRunner::new("test \"$GREENLIGHT_REVISION\" = nope", Duration::from_secs(5));
        assert!(matches!(
            runner.run_tests(&trigger()).await,
            Err(StageFailure::Test(_))
        ));
        let runner = CommandTestRunner::new("test -n \"$GREENLIGHT_REVISION\"", Duration::from_secs(5));
        runner.run_tests(&trigger()).await.unwrap();
    }

    #[test]
    fn from_config_skips_missing_commands() {
        let config = BuildConfig::default();
        assert!(CommandBuildService::from_config(&config).unwrap().is_none());
        assert!(CommandTestRunner::from_config(&config).unwrap().is_none());
    }
}
