//! Persisted records for the Greenlight state store.
//!
//! These types represent pipeline runs and their stage results, the
//! outcome of a trigger claim, and the last known deployment target
//! assignment. All types are serializable to/from JSON for storage in
//! redb tables.

use serde::{Deserialize, Serialize};

use greenlight_core::{Artifact, Environment, RunId, SourceTrigger, StageName};

// ── Pipeline runs ──────────────────────────────────────────────────

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted and waiting behind the active run.
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// Status of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Outcome of one stage. Appended to its run once settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    /// Artifacts the stage produced.
    pub artifacts: Vec<Artifact>,
    /// Present only when `status` is `Failed`.
    pub failure: Option<String>,
    pub started_at: u64,
    pub finished_at: u64,
}

impl StageResult {
    pub fn succeeded(stage: StageName, artifacts: Vec<Artifact>, started_at: u64, finished_at: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            artifacts,
            failure: None,
            started_at,
            finished_at,
        }
    }

    pub fn failed(stage: StageName, reason: String, started_at: u64, finished_at: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            artifacts: Vec::new(),
            failure: Some(reason),
            started_at,
            finished_at,
        }
    }
}

/// One execution of the stage sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub trigger: SourceTrigger,
    /// Settled stages, in execution order.
    pub stages: Vec<StageResult>,
    pub status: RunStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PipelineRun {
    /// A freshly accepted run that has not started yet.
    pub fn queued(trigger: SourceTrigger, now: u64) -> Self {
        Self {
            id: trigger.run_id(),
            trigger,
            stages: Vec::new(),
            status: RunStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    /// Result for a stage, if it ran.
    pub fn stage(&self, stage: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Artifacts produced by all settled stages, in production order.
    pub fn produced_artifacts(&self) -> Vec<Artifact> {
        self.stages
            .iter()
            .flat_map(|r| r.artifacts.iter().cloned())
            .collect()
    }

    /// The first failure reason, if the run failed.
    pub fn failure(&self) -> Option<(StageName, &str)> {
        self.stages
            .iter()
            .find_map(|r| r.failure.as_deref().map(|reason| (r.stage, reason)))
    }
    /// Settle an unfinished run as failed at the stage that would have run
    /// next.
    pub fn abandon(&mut self, reason: impl Into<String>, now: u64) {
        if let Some(stage) = StageName::ORDER.get(self.stages.len()).copied() {
            self.stages
                .push(StageResult::failed(stage, reason.into(), self.updated_at, now));
        }
        self.status = RunStatus::Failed;
        self.updated_at = now;
    }
}

// ── Trigger ledger ─────────────────────────────────────────────────

/// Outcome of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "claim", content = "run_id", rename_all = "snake_case")]
pub enum TriggerClaim {
    /// First delivery for this key.
    New,
    /// The key was already claimed by this run.
    Duplicate(RunId),
}

/// Outcome of [`StateStore::enqueue_run`](crate::StateStore::enqueue_run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// The key was already claimed by this run.
    Duplicate(RunId),
    /// The pending queue is at capacity; nothing was recorded.
    Full,
}

// ── Deployment targets ─────────────────────────────────────────────

/// Last known production assignment, restored on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub active: Environment,
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_run_uses_trigger_run_id() {
        let trigger = SourceTrigger::new("r1", "key-1").unwrap();
        let run = PipelineRun::queued(trigger.clone(), 1000);
        assert_eq!(run.id, trigger.run_id());
        assert_eq!(run.status, RunStatus::Queued);
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn produced_artifacts_follow_stage_order() {
        let trigger = SourceTrigger::new("r1", "key-1").unwrap();
        let mut run = PipelineRun::queued(trigger, 1000);
        let source = Artifact::describe("SourceArtifact", StageName::Source, b"src");
        let build = Artifact::describe("BuildArtifact", StageName::Build, b"build");
        run.stages.push(StageResult::succeeded(StageName::Source, vec![source.clone()], 1, 2));
        run.stages.push(StageResult::succeeded(StageName::Test, vec![], 2, 3));
        run.stages.push(StageResult::succeeded(StageName::Build, vec![build.clone()], 3, 4));

        assert_eq!(run.produced_artifacts(), vec![source, build]);
        assert!(run.failure().is_none());
    }

    #[test]
    fn failure_reports_first_failed_stage() {
        let trigger = SourceTrigger::new("r1", "key-1").unwrap();
        let mut run = PipelineRun::queued(trigger, 1000);
        run.stages.push(StageResult::succeeded(StageName::Source, vec![], 1, 2));
        run.stages.push(StageResult::failed(StageName::Test, "3 tests failed".to_string(), 2, 3));
        assert_eq!(run.failure(), Some((StageName::Test, "3 tests failed")));
        assert!(run.stage(StageName::Build).is_none());
    }

    #[test]
    fn abandon_fails_the_next_stage() {
        let trigger = SourceTrigger::new("r1", "key-1").unwrap();
        let mut run = PipelineRun::queued(trigger, 1000);
        run.status = RunStatus::Running;
        run.stages.push(StageResult::succeeded(StageName::Source, vec![], 1000, 1200));
        run.updated_at = 1200;

        run.abandon("state store error: disk full", 1500);

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.updated_at, 1500);
        assert_eq!(run.failure(), Some((StageName::Test, "state store error: disk full")));
        assert_eq!(run.stage(StageName::Test).unwrap().started_at, 1200);
    }

    #[test]
    fn abandon_after_the_last_stage_only_settles_status() {
        let trigger = SourceTrigger::new("r1", "key-1").unwrap();
        let mut run = PipelineRun::queued(trigger, 1000);
        for stage in StageName::ORDER {
            run.stages.push(StageResult::succeeded(stage, vec![], 1, 2));
        }
        run.abandon("state store error", 3);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.stages.len(), StageName::ORDER.len());
    }

    #[test]
    fn trigger_claim_serializes_tagged() {
        let json = serde_json::to_string(&TriggerClaim::Duplicate("run-1".to_string())).unwrap();
        assert_eq!(json, r#"{"claim":"duplicate","run_id":"run-1"}"#);
    }
}
