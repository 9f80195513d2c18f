//! Pipeline engine. Drives one run through Source → Test → Build → Deploy.
//!
//! The engine:
//! - Loads or creates the run record for a trigger
//! - Executes the stages strictly in order, handing each one the artifacts
//!   it declared as inputs
//! - Settles every stage as succeeded or failed and persists the run after
//!   each transition
//! - Halts at the first failed stage; later stages never start
//!
//! Runs are mutually exclusive. A second caller waits on a fair lock until
//! the active run finishes, so runs settle in the order they asked.

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use greenlight_core::{Artifact, Event, EventBus, SourceTrigger, epoch_millis};
use greenlight_state::{PipelineRun, RunStatus, StageResult, StateStore};

use crate::error::{PipelineError, PipelineResult, StageFailure};
use crate::stage::{PIPELINE, StageContext, StageSpec};
use crate::stages::Stages;

/// Executes pipeline runs one at a time.
pub struct PipelineEngine {
    store: StateStore,
    events: EventBus,
    stages: Stages,
    /// Held for the duration of a run.
    exclusive: Mutex<()>,
}

impl PipelineEngine {
    pub fn new(store: StateStore, events: EventBus, stages: Stages) -> Self {
        Self {
            store,
            events,
            stages,
            exclusive: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run the pipeline for `trigger` to completion.
    ///
    /// A run that already settled is returned as-is; nothing re-executes.
    /// Stage failures are recorded on the returned run, not surfaced as
    /// errors. `Err` means the engine itself could not make progress.
    pub async fn run(&self, trigger: &SourceTrigger) -> PipelineResult<PipelineRun> {
        trigger.validate()?;
        let _exclusive = self.exclusive.lock().await;

        let run_id = trigger.run_id();
        let mut run = match self.store.get_run(&run_id)? {
            Some(run) if run.status.is_terminal() => {
                debug!(%run_id, status = ?run.status, "run already settled");
                return Ok(run);
            }
            Some(run) => run,
            None => PipelineRun::queued(trigger.clone(), epoch_millis()),
        };

        run.stages.clear();
        run.status = RunStatus::Running;
        run.updated_at = epoch_millis();
        self.persist(&mut run)?;
        info!(%run_id, revision = %run.trigger.revision, "pipeline run started");

        let ctx = StageContext {
            run_id: run.id.clone(),
            trigger: run.trigger.clone(),
        };

        for spec in PIPELINE.iter() {
            let started_at = epoch_millis();
            self.events.emit(Event::stage(&run.id, spec.name, "running"));

            let produced = run.produced_artifacts();
            let outcome = self.execute_stage(spec, &ctx, &produced).await;
            let finished_at = epoch_millis();

            match outcome {
                Ok(artifacts) => {
                    self.events.emit(Event::stage(&run.id, spec.name, "succeeded"));
                    run.stages
                        .push(StageResult::succeeded(spec.name, artifacts, started_at, finished_at));
                }
                Err(failure) => {
                    let reason = failure.to_string();
                    warn!(%run_id, stage = %spec.name, %reason, "stage failed");
                    self.events
                        .emit(Event::stage(&run.id, spec.name, "failed").with_detail(reason.clone()));
                    run.stages
                        .push(StageResult::failed(spec.name, reason, started_at, finished_at));
                    run.status = RunStatus::Failed;
                }
            }

            run.updated_at = finished_at;
            self.persist(&mut run)?;
            if run.status == RunStatus::Failed {
                info!(%run_id, stage = %spec.name, "pipeline run failed");
                return Ok(run);
            }
        }

        run.status = RunStatus::Succeeded;
        run.updated_at = epoch_millis();
        self.persist(&mut run)?;
        info!(%run_id, "pipeline run succeeded");
        Ok(run)
    }

    /// Run a previously queued run by id.
    pub async fn run_queued(&self, run_id: &str) -> PipelineResult<PipelineRun> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| PipelineError::RunNotFound(run_id.to_string()))?;
        self.run(&run.trigger).await
    }

    /// Store `run`. If the write fails, make one more attempt to record the
    /// run as failed so it is not left `Running` until the next restart.
    fn persist(&self, run: &mut PipelineRun) -> PipelineResult<()> {
        let Err(e) = self.store.put_run(run) else {
            return Ok(());
        };
        error!(run_id = %run.id, error = %e, "failed to persist run");
        if run.status != RunStatus::Failed {
            run.abandon(format!("state store error: {e}"), epoch_millis());
        }
        if let Err(retry) = self.store.put_run(run) {
            error!(run_id = %run.id, error = %retry, "failed to record run as failed");
        }
        Err(e.into())
    }

    async fn execute_stage(
        &self,
        spec: &StageSpec,
        ctx: &StageContext,
        produced: &[Artifact],
    ) -> Result<Vec<Artifact>, StageFailure> {
        let inputs = spec.select_inputs(produced)?;
        let artifacts = self
            .stages
            .executor(spec.name)
            .execute(ctx, &inputs)
            .await?;
        spec.check_outputs(&artifacts)?;
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use greenlight_core::{
        BoxFuture, Environment, EventSubject, HealthVerdict, RolloutStatus, StageName, WeightSplit,
    };
    use greenlight_health::testing::Scripted;
    use greenlight_rollout::testing::RecordingBackend;
    use greenlight_state::StageStatus;

    use crate::testing::{FakeBuildService, FakeTestRunner, Harness};

    fn trigger(key: &str) -> SourceTrigger {
        SourceTrigger::new("main@0123456789abcdef", key).unwrap()
    }

    fn stage_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<(StageName, String)> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EventSubject::Stage(stage) = event.subject {
                seen.push((stage, event.outcome));
            }
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_run_completes_every_stage_in_order() {
        let harness = Harness::new();
        let mut rx = harness.events.subscribe();

        let run = harness.engine.run(&trigger("delivery-1")).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        let order: Vec<StageName> = run.stages.iter().map(|s| s.stage).collect();
        assert_eq!(order, StageName::ORDER.to_vec());
        assert!(run.stages.iter().all(|s| s.status == StageStatus::Succeeded));
        assert_eq!(harness.controller.targets().active_environment(), Environment::Green);

        let stored = harness.store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored, run);
        let report = harness.store.get_rollout(&run.id).unwrap().unwrap();
        assert_eq!(report.status, RolloutStatus::Completed);
        assert_eq!(harness.store.get_targets().unwrap().unwrap().active, Environment::Green);

        let seen = stage_events(&mut rx);
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[0], (StageName::Source, "running".to_string()));
        assert_eq!(seen[7], (StageName::Deploy, "succeeded".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_after_shutdown_fails_without_touching_traffic() {
        let harness = Harness::new();
        // Shutdown lands while the run is still building.
        harness.controller.shutdown();

        let run = harness.engine.run(&trigger("delivery-late")).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        let (stage, reason) = run.failure().unwrap();
        assert_eq!(stage, StageName::Deploy);
        assert!(reason.contains("shutting down"), "{reason}");
        assert_eq!(harness.builder.calls(), 1);
        assert!(harness.backend.calls().is_empty());
        assert!(harness.store.get_rollout(&run.id).unwrap().is_none());
        assert_eq!(harness.controller.targets().active_environment(), Environment::Blue);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_tests_halt_before_build() {
        let harness = Harness::with_parts(
            FakeBuildService::succeeding("registry.example.com/web:r1"),
            FakeTestRunner::failing("2 failed"),
            RecordingBackend::new(),
        );

        let run = harness.engine.run(&trigger("delivery-2")).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.stages.len(), 2);
        assert_eq!(run.failure(), Some((StageName::Test, "tests failed: 2 failed")));
        assert_eq!(harness.builder.calls(), 0);
        assert!(harness.backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rolled_back_rollout_fails_the_deploy_stage() {
        let harness = Harness::new();
        harness.monitor.push_n(Environment::Green, HealthVerdict::Healthy, 3);
        harness
            .monitor
            .push(Environment::Green, Scripted::Verdict(HealthVerdict::Unhealthy));

        let run = harness.engine.run(&trigger("delivery-3")).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        let (stage, reason) = run.failure().unwrap();
        assert_eq!(stage, StageName::Deploy);
        assert!(reason.contains("RolledBack"), "{reason}");
        assert_eq!(harness.controller.targets().active_environment(), Environment::Blue);
        assert_eq!(
            harness.backend.applied_splits().last(),
            Some(&WeightSplit { blue: 100, green: 0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn settled_run_is_not_executed_again() {
        let harness = Harness::new();
        let first = harness.engine.run(&trigger("delivery-4")).await.unwrap();
        let again = harness.engine.run(&trigger("delivery-4")).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(harness.builder.calls(), 1);
        assert_eq!(harness.tests.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_queued_requires_a_record() {
        let harness = Harness::new();
        let err = harness.engine.run_queued("run-missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::RunNotFound(_)));
    }

    struct Silent;

    impl crate::stage::StageExecutor for Silent {
        fn execute<'a>(
            &'a self,
            _ctx: &'a StageContext,
            _inputs: &'a [Artifact],
        ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stage_that_skips_its_output_fails() {
        let harness = Harness::new();
        let mut stages = harness.stages.clone();
        stages.build = Arc::new(Silent);
        let engine = PipelineEngine::new(harness.store.clone(), harness.events.clone(), stages);

        let run = engine.run(&trigger("delivery-5")).await.unwrap();

        let (stage, reason) = run.failure().unwrap();
        assert_eq!(stage, StageName::Build);
        assert!(reason.contains("did not produce BuildArtifact"));
        assert!(harness.backend.calls().is_empty());
    }
}
