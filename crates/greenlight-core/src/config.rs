//! greenlight.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Environment, StageName};

/// Configuration errors. Raised while loading and validating, never later.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("traffic-shift increment must satisfy 0 < increment <= 100, got {0}")]
    InvalidIncrement(u32),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("pipeline stages must be declared as Source, Test, Build, Deploy; got [{0}]")]
    StageOrder(String),

    #[error("unknown deployment config preset: {0}")]
    UnknownPreset(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreenlightConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub repository: Option<String>,
    /// Environment serving production on first start.
    #[serde(default = "default_initial_active")]
    pub initial_active: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Declared stage names. Exposed for observability; the order is fixed.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Pending triggers held behind the active run.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub test_command: Option<String>,
    pub build_command: Option<String>,
    #[serde(default = "default_build_timeout")]
    pub timeout: String,
    /// Image repository the build pushes to.
    pub repository: Option<String>,
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default = "default_cpu_units")]
    pub cpu_units: u32,
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Named linear preset, e.g. `LINEAR_10PERCENT_EVERY_1MINUTES`.
    pub deployment_config: Option<String>,
    /// Overrides the preset increment.
    pub increment_percent: Option<u32>,
    /// Overrides the preset interval.
    pub interval: Option<String>,
    #[serde(default = "default_staging_timeout")]
    pub staging_timeout: String,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: String,
    #[serde(default = "default_readiness_poll_interval")]
    pub readiness_poll_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe address (host:port) for the blue environment.
    pub blue: Option<String>,
    /// Probe address (host:port) for the green environment.
    pub green: Option<String>,
    #[serde(default = "default_health_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    pub stage_command: Option<String>,
    pub weights_command: Option<String>,
    pub teardown_command: Option<String>,
}

fn default_initial_active() -> Environment {
    Environment::Blue
}

fn default_stages() -> Vec<String> {
    StageName::ORDER.iter().map(|s| s.as_str().to_string()).collect()
}

fn default_queue_capacity() -> usize {
    32
}

fn default_build_timeout() -> String {
    "30m".to_string()
}

fn default_container_name() -> String {
    "web".to_string()
}

fn default_container_port() -> u16 {
    80
}

fn default_cpu_units() -> u32 {
    256
}

fn default_memory_mib() -> u32 {
    512
}

fn default_staging_timeout() -> String {
    "5m".to_string()
}

fn default_health_check_timeout() -> String {
    "5s".to_string()
}

fn default_readiness_poll_interval() -> String {
    "5s".to_string()
}

fn default_health_path() -> String {
    "/healthz".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            test_command: None,
            build_command: None,
            timeout: default_build_timeout(),
            repository: None,
            container_name: default_container_name(),
            container_port: default_container_port(),
            cpu_units: default_cpu_units(),
            memory_mib: default_memory_mib(),
        }
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            deployment_config: None,
            increment_percent: None,
            interval: None,
            staging_timeout: default_staging_timeout(),
            health_check_timeout: default_health_check_timeout(),
            readiness_poll_interval: default_readiness_poll_interval(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            blue: None,
            green: None,
            path: default_health_path(),
        }
    }
}

impl GreenlightConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GreenlightConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check everything that can be checked without the rollout presets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "service.name",
                reason: "must not be empty".to_string(),
            });
        }
        self.declared_stages()?;
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }

        duration_field("build.timeout", &self.build.timeout)?;
        if self.build.container_port == 0 {
            return Err(ConfigError::Invalid {
                field: "build.container_port",
                reason: "must be non-zero".to_string(),
            });
        }

        if let Some(increment) = self.rollout.increment_percent {
            if increment == 0 || increment > 100 {
                return Err(ConfigError::InvalidIncrement(increment));
            }
        }
        if let Some(interval) = &self.rollout.interval {
            duration_field("rollout.interval", interval)?;
        }
        duration_field("rollout.staging_timeout", &self.rollout.staging_timeout)?;
        duration_field("rollout.health_check_timeout", &self.rollout.health_check_timeout)?;
        duration_field(
            "rollout.readiness_poll_interval",
            &self.rollout.readiness_poll_interval,
        )?;

        if !self.health.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "health.path",
                reason: "must start with '/'".to_string(),
            });
        }
        Ok(())
    }

    /// The declared stage list, which must spell out the fixed order.
    pub fn declared_stages(&self) -> Result<Vec<StageName>, ConfigError> {
        let parsed: Vec<Option<StageName>> = self
            .pipeline
            .stages
            .iter()
            .map(|s| StageName::parse(s))
            .collect();
        if parsed.iter().copied().eq(StageName::ORDER.iter().copied().map(Some)) {
            Ok(StageName::ORDER.to_vec())
        } else {
            Err(ConfigError::StageOrder(self.pipeline.stages.join(", ")))
        }
    }

    /// Scaffold a minimal greenlight.toml for a service.
    pub fn scaffold(name: &str) -> Self {
        GreenlightConfig {
            service: ServiceConfig {
                name: name.to_string(),
                repository: None,
                initial_active: Environment::Blue,
            },
            pipeline: PipelineConfig::default(),
            build: BuildConfig {
                test_command: Some("npm test".to_string()),
                build_command: Some("./build.sh".to_string()),
                ..Default::default()
            },
            rollout: RolloutConfig {
                deployment_config: Some("LINEAR_10PERCENT_EVERY_1MINUTES".to_string()),
                ..Default::default()
            },
            health: HealthConfig {
                blue: Some("127.0.0.1:8081".to_string()),
                green: Some("127.0.0.1:8082".to_string()),
                path: default_health_path(),
            },
            backend: BackendConfig::default(),
        }
    }
}

/// Parse a duration field that must be strictly positive.
pub fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(duration)
}

/// Parse a duration string like "500ms", "5s", "1m", "2h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
