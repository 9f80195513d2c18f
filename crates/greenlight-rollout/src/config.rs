//! Traffic shift configuration: cadence, increment, and bounded waits.

use std::fmt;
use std::time::Duration;

use greenlight_core::config::RolloutConfig;
use greenlight_core::{ConfigError, duration_field};

/// Named linear deployment configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearPreset {
    /// 10% every minute. Default.
    Linear10PercentEvery1Minute,
    /// 10% every three minutes.
    Linear10PercentEvery3Minutes,
    /// Full cutover on the first tick.
    AllAtOnce,
}

impl LinearPreset {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim() {
            "LINEAR_10PERCENT_EVERY_1MINUTES" => Ok(Self::Linear10PercentEvery1Minute),
            "LINEAR_10PERCENT_EVERY_3MINUTES" => Ok(Self::Linear10PercentEvery3Minutes),
            "ALL_AT_ONCE" => Ok(Self::AllAtOnce),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear10PercentEvery1Minute => "LINEAR_10PERCENT_EVERY_1MINUTES",
            Self::Linear10PercentEvery3Minutes => "LINEAR_10PERCENT_EVERY_3MINUTES",
            Self::AllAtOnce => "ALL_AT_ONCE",
        }
    }

    /// (increment percent, interval)
    pub fn parameters(&self) -> (u8, Duration) {
        match self {
            Self::Linear10PercentEvery1Minute => (10, Duration::from_secs(60)),
            Self::Linear10PercentEvery3Minutes => (10, Duration::from_secs(180)),
            Self::AllAtOnce => (100, Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for LinearPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated configuration for one traffic shift.
///
/// Construct with [`ShiftConfig::new`] or [`ShiftConfig::from_config`];
/// both reject a zero or over-100 increment and zero durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftConfig {
    increment_percent: u8,
    interval: Duration,
    staging_timeout: Duration,
    health_check_timeout: Duration,
    readiness_poll_interval: Duration,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            increment_percent: 10,
            interval: Duration::from_secs(60),
            staging_timeout: Duration::from_secs(300),
            health_check_timeout: Duration::from_secs(5),
            readiness_poll_interval: Duration::from_secs(5),
        }
    }
}

impl ShiftConfig {
    /// Cadence and increment with default timeouts.
    pub fn new(increment_percent: u32, interval: Duration) -> Result<Self, ConfigError> {
        if increment_percent == 0 || increment_percent > 100 {
            return Err(ConfigError::InvalidIncrement(increment_percent));
        }
        if interval.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "rollout.interval" });
        }
        Ok(Self {
            increment_percent: increment_percent as u8,
            interval,
            ..Self::default()
        })
    }

    pub fn from_preset(preset: LinearPreset) -> Self {
        let (increment_percent, interval) = preset.parameters();
        Self {
            increment_percent,
            interval,
            ..Self::default()
        }
    }

    /// Resolve the `[rollout]` section: preset first, explicit fields override.
    pub fn from_config(config: &RolloutConfig) -> Result<Self, ConfigError> {
        let base = match &config.deployment_config {
            Some(name) => Self::from_preset(LinearPreset::parse(name)?),
            None => Self::default(),
        };
        let increment = config
            .increment_percent
            .unwrap_or(base.increment_percent as u32);
        let interval = match &config.interval {
            Some(value) => duration_field("rollout.interval", value)?,
            None => base.interval,
        };
        Self::new(increment, interval)?
            .with_staging_timeout(duration_field("rollout.staging_timeout", &config.staging_timeout)?)?
            .with_health_check_timeout(duration_field(
                "rollout.health_check_timeout",
                &config.health_check_timeout,
            )?)?
            .with_readiness_poll_interval(duration_field(
                "rollout.readiness_poll_interval",
                &config.readiness_poll_interval,
            )?)
    }

    pub fn with_staging_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "rollout.staging_timeout" });
        }
        self.staging_timeout = timeout;
        Ok(self)
    }

    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "rollout.health_check_timeout" });
        }
        self.health_check_timeout = timeout;
        Ok(self)
    }

    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "rollout.readiness_poll_interval" });
        }
        self.readiness_poll_interval = interval;
        Ok(self)
    }

    pub fn increment_percent(&self) -> u8 {
        self.increment_percent
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn staging_timeout(&self) -> Duration {
        self.staging_timeout
    }

    pub fn health_check_timeout(&self) -> Duration {
        self.health_check_timeout
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        self.readiness_poll_interval
    }

    /// Number of increments needed to reach 100.
    pub fn steps(&self) -> u32 {
        100u32.div_ceil(self.increment_percent as u32)
    }
}
