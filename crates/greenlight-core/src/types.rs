//! Shared types used across Greenlight crates.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a pipeline run.
pub type RunId = String;

// ── Stages ─────────────────────────────────────────────────────────

/// The four stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageName {
    Source,
    Test,
    Build,
    Deploy,
}

impl StageName {
    /// The fixed stage order.
    pub const ORDER: [StageName; 4] = [
        StageName::Source,
        StageName::Test,
        StageName::Build,
        StageName::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Source => "Source",
            StageName::Test => "Test",
            StageName::Build => "Build",
            StageName::Deploy => "Deploy",
        }
    }

    /// Parse a declared stage name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        StageName::ORDER
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Artifacts ──────────────────────────────────────────────────────

/// Content reference handed from one stage to a later one.
///
/// Artifacts are write-once: the checksum is the SHA-256 of the content,
/// and the location is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical name, e.g. `SourceArtifact`.
    pub name: String,
    /// Content address: `artifact://sha256/{checksum}`.
    pub location: String,
    /// Hex-encoded SHA-256 of the content.
    pub checksum: String,
    /// The stage that produced this artifact.
    pub producer: StageName,
    /// Content length in bytes.
    pub size: u64,
}

impl Artifact {
    /// Describe a piece of content produced by `producer`.
    pub fn describe(name: &str, producer: StageName, content: &[u8]) -> Self {
        let checksum = sha256_hex(content);
        Self {
            name: name.to_string(),
            location: format!("artifact://sha256/{checksum}"),
            checksum,
            producer,
            size: content.len() as u64,
        }
    }

    /// Whether `content` matches this artifact's checksum.
    pub fn verify(&self, content: &[u8]) -> bool {
        sha256_hex(content) == self.checksum
    }
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

// ── Environments ───────────────────────────────────────────────────

/// One of the two fixed deployment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Blue,
    Green,
}

impl Environment {
    /// The other slot.
    pub fn other(self) -> Self {
        match self {
            Environment::Blue => Environment::Green,
            Environment::Green => Environment::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Blue => "blue",
            Environment::Green => "green",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic weights across both environments. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSplit {
    pub blue: u8,
    pub green: u8,
}

impl WeightSplit {
    /// Build a split where `toward` carries `weight` and the other slot the rest.
    /// `weight` is clamped to 100.
    pub fn toward(toward: Environment, weight: u8) -> Self {
        let weight = weight.min(100);
        match toward {
            Environment::Blue => Self {
                blue: weight,
                green: 100 - weight,
            },
            Environment::Green => Self {
                blue: 100 - weight,
                green: weight,
            },
        }
    }

    /// Weight carried by `env`.
    pub fn weight_of(&self, env: Environment) -> u8 {
        match env {
            Environment::Blue => self.blue,
            Environment::Green => self.green,
        }
    }
}

impl fmt::Display for WeightSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blue={}/green={}", self.blue, self.green)
    }
}

// ── Health ─────────────────────────────────────────────────────────

/// Verdict reported by the health monitor for one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
    /// No verdict could be obtained in time.
    Unreachable,
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Unhealthy => "unhealthy",
            HealthVerdict::Unreachable => "unreachable",
        })
    }
}

// ── Rollouts ───────────────────────────────────────────────────────

/// Status of a blue/green rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStatus {
    Staging,
    Shifting,
    Completed,
    RolledBack,
    Failed,
}

impl RolloutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutStatus::Completed | RolloutStatus::RolledBack | RolloutStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutStatus::Staging => "Staging",
            RolloutStatus::Shifting => "Shifting",
            RolloutStatus::Completed => "Completed",
            RolloutStatus::RolledBack => "RolledBack",
            RolloutStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RolloutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The health check that ended a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingCheck {
    pub environment: Environment,
    pub verdict: HealthVerdict,
    /// Weight the environment carried when the check ran.
    pub at_weight: u8,
}

/// Terminal summary of a rollout, archived with its pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub run_id: RunId,
    pub image: String,
    /// Environment the new revision was staged into.
    pub target: Environment,
    /// Environment that was serving production when the rollout began.
    pub original_active: Environment,
    pub status: RolloutStatus,
    /// Highest weight the target reached before the rollout ended.
    pub peak_weight: u8,
    /// Weight split in effect after the rollout ended.
    pub final_split: WeightSplit,
    /// Number of increments applied.
    pub shift_count: u32,
    pub failing_check: Option<FailingCheck>,
    pub reason: Option<String>,
    pub started_at: u64,
    pub finished_at: u64,
}

impl RolloutReport {
    /// One-line human summary for stage failure messages and logs.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "rollout {} into {} (peak {}%, final {})",
            self.status, self.target, self.peak_weight, self.final_split
        );
        if let Some(check) = &self.failing_check {
            line.push_str(&format!(
                "; {} reported {} at {}%",
                check.environment, check.verdict, check.at_weight
            ));
        }
        if let Some(reason) = &self.reason {
            line.push_str(&format!("; {reason}"));
        }
        line
    }
}

/// Boxed, sendable future used at the async trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Milliseconds since the unix epoch.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(
            StageName::ORDER.map(|s| s.as_str()),
            ["Source", "Test", "Build", "Deploy"]
        );
        assert_eq!(StageName::parse("build"), Some(StageName::Build));
        assert_eq!(StageName::parse("Lint"), None);
    }

    #[test]
    fn artifact_checksum_is_content_address() {
        let artifact = Artifact::describe("SourceArtifact", StageName::Source, b"hello");
        assert_eq!(
            artifact.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(artifact.location.ends_with(&artifact.checksum));
        assert!(artifact.verify(b"hello"));
        assert!(!artifact.verify(b"hello!"));
        assert_eq!(artifact.size, 5);
    }

    #[test]
    fn weight_split_always_sums_to_100() {
        for w in [0u8, 10, 55, 100, 200] {
            let split = WeightSplit::toward(Environment::Green, w);
            assert_eq!(split.blue as u16 + split.green as u16, 100);
        }
        let split = WeightSplit::toward(Environment::Blue, 30);
        assert_eq!(split.weight_of(Environment::Blue), 30);
        assert_eq!(split.weight_of(Environment::Green), 70);
    }

    #[test]
    fn environment_other() {
        assert_eq!(Environment::Blue.other(), Environment::Green);
        assert_eq!(Environment::Green.other(), Environment::Blue);
    }

    #[test]
    fn report_summary_mentions_failing_check() {
        let report = RolloutReport {
            run_id: "run-1".to_string(),
            image: "img:r1".to_string(),
            target: Environment::Green,
            original_active: Environment::Blue,
            status: RolloutStatus::RolledBack,
            peak_weight: 50,
            final_split: WeightSplit::toward(Environment::Blue, 100),
            shift_count: 5,
            failing_check: Some(FailingCheck {
                environment: Environment::Green,
                verdict: HealthVerdict::Unhealthy,
                at_weight: 50,
            }),
            reason: None,
            started_at: 0,
            finished_at: 0,
        };
        let summary = report.summary();
        assert!(summary.contains("RolledBack"));
        assert!(summary.contains("green reported unhealthy at 50%"));
        assert!(summary.contains("blue=100/green=0"));
    }
}
