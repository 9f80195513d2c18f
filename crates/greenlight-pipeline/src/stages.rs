//! The four stage executors.
//!
//! Artifacts move between stages only through the artifact store: a stage
//! writes what it produces, and later stages read it back by checksum. A
//! stage never writes an artifact it did not produce.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info};

use greenlight_core::config::BuildConfig;
use greenlight_core::{
    Artifact, BoxFuture, DeploymentDescriptor, DeploymentRevision, RolloutStatus, SourceRef, StageName,
    epoch_millis,
};
use greenlight_rollout::TrafficShiftController;
use greenlight_state::{StateStore, TargetState};

use crate::error::StageFailure;
use crate::services::{BuildService, TestRunner};
use crate::stage::{BUILD_ARTIFACT, SOURCE_ARTIFACT, StageContext, StageExecutor, input};

fn write_json<T: Serialize>(
    store: &StateStore,
    name: &str,
    producer: StageName,
    value: &T,
) -> Result<Artifact, StageFailure> {
    let content = serde_json::to_vec_pretty(value).map_err(|e| StageFailure::Artifact(e.to_string()))?;
    let artifact = Artifact::describe(name, producer, &content);
    store.put_artifact(&artifact, &content)?;
    Ok(artifact)
}

fn read_json<T: DeserializeOwned>(store: &StateStore, artifact: &Artifact) -> Result<T, StageFailure> {
    let content = store.read_artifact(artifact)?;
    serde_json::from_slice(&content)
        .map_err(|e| StageFailure::Artifact(format!("{} is malformed: {e}", artifact.name)))
}

/// Snapshots the triggering revision into `SourceArtifact`.
pub struct SourceStage {
    store: StateStore,
}

impl SourceStage {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl StageExecutor for SourceStage {
    fn execute<'a>(
        &'a self,
        ctx: &'a StageContext,
        _inputs: &'a [Artifact],
    ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>> {
        Box::pin(async move {
            let source = ctx.trigger.source_ref();
            let artifact = write_json(&self.store, SOURCE_ARTIFACT, StageName::Source, &source)?;
            info!(run_id = %ctx.run_id, revision = %source.revision, checksum = %artifact.checksum, "source captured");
            Ok(vec![artifact])
        })
    }
}

/// Runs the test suite against the captured source.
pub struct TestStage {
    store: StateStore,
    runner: Arc<dyn TestRunner>,
}

impl TestStage {
    pub fn new(store: StateStore, runner: Arc<dyn TestRunner>) -> Self {
        Self { store, runner }
    }
}

impl StageExecutor for TestStage {
    fn execute<'a>(
        &'a self,
        ctx: &'a StageContext,
        inputs: &'a [Artifact],
    ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>> {
        Box::pin(async move {
            let source: SourceRef = read_json(&self.store, input(inputs, SOURCE_ARTIFACT)?)?;
            self.runner.run_tests(&source).await?;
            info!(run_id = %ctx.run_id, revision = %source.revision, "tests passed");
            Ok(Vec::new())
        })
    }
}

/// Container sizing written into every descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub port: u16,
    pub cpu_units: u32,
    pub memory_mib: u32,
}

impl From<&BuildConfig> for ContainerSpec {
    fn from(config: &BuildConfig) -> Self {
        Self {
            name: config.container_name.clone(),
            port: config.container_port,
            cpu_units: config.cpu_units,
            memory_mib: config.memory_mib,
        }
    }
}

/// Builds the image and emits the deployment descriptor as `BuildArtifact`.
pub struct BuildStage {
    store: StateStore,
    builder: Arc<dyn BuildService>,
    container: ContainerSpec,
}

impl BuildStage {
    pub fn new(store: StateStore, builder: Arc<dyn BuildService>, container: ContainerSpec) -> Self {
        Self {
            store,
            builder,
            container,
        }
    }
}

impl StageExecutor for BuildStage {
    fn execute<'a>(
        &'a self,
        ctx: &'a StageContext,
        inputs: &'a [Artifact],
    ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>> {
        Box::pin(async move {
            let source: SourceRef = read_json(&self.store, input(inputs, SOURCE_ARTIFACT)?)?;
            let image = self.builder.build(&source).await?;
            let descriptor = DeploymentDescriptor::new(
                &image,
                &self.container.name,
                self.container.port,
                self.container.cpu_units,
                self.container.memory_mib,
            );
            descriptor.validate()?;
            let content = descriptor.to_json_bytes()?;
            let artifact = Artifact::describe(BUILD_ARTIFACT, StageName::Build, &content);
            self.store.put_artifact(&artifact, &content)?;
            info!(run_id = %ctx.run_id, %image, checksum = %artifact.checksum, "deployment descriptor written");
            Ok(vec![artifact])
        })
    }
}

/// Turns the descriptor into a revision and rolls it out.
pub struct DeployStage {
    store: StateStore,
    controller: Arc<TrafficShiftController>,
}

impl DeployStage {
    pub fn new(store: StateStore, controller: Arc<TrafficShiftController>) -> Self {
        Self { store, controller }
    }

    fn archive(&self, report: &greenlight_core::RolloutReport) {
        if let Err(e) = self.store.put_rollout(report) {
            error!(run_id = %report.run_id, error = %e, "failed to archive rollout");
        }
        let targets = TargetState {
            active: self.controller.targets().active_environment(),
            updated_at: epoch_millis(),
        };
        if let Err(e) = self.store.put_targets(&targets) {
            error!(run_id = %report.run_id, error = %e, "failed to persist target state");
        }
    }
}

impl StageExecutor for DeployStage {
    fn execute<'a>(
        &'a self,
        ctx: &'a StageContext,
        inputs: &'a [Artifact],
    ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>> {
        Box::pin(async move {
            let content = self.store.read_artifact(input(inputs, BUILD_ARTIFACT)?)?;
            let descriptor = DeploymentDescriptor::from_json_bytes(&content)?;
            let revision =
                DeploymentRevision::from_descriptor(&ctx.run_id, &ctx.trigger.revision, descriptor)?;

            let report = self
                .controller
                .run(&revision)
                .await
                .map_err(|e| StageFailure::Infrastructure(e.to_string()))?;
            self.archive(&report);

            match report.status {
                RolloutStatus::Completed => Ok(Vec::new()),
                _ => Err(StageFailure::Rollout(report.summary())),
            }
        })
    }
}

/// The executor for each stage of the fixed pipeline.
#[derive(Clone)]
pub struct Stages {
    pub source: Arc<dyn StageExecutor>,
    pub test: Arc<dyn StageExecutor>,
    pub build: Arc<dyn StageExecutor>,
    pub deploy: Arc<dyn StageExecutor>,
}

impl Stages {
    /// The production wiring: store-backed artifacts, the given build and
    /// test collaborators, and a rollout through `controller`.
    pub fn standard(
        store: StateStore,
        runner: Arc<dyn TestRunner>,
        builder: Arc<dyn BuildService>,
        container: ContainerSpec,
        controller: Arc<TrafficShiftController>,
    ) -> Self {
        Self {
            source: Arc::new(SourceStage::new(store.clone())),
            test: Arc::new(TestStage::new(store.clone(), runner)),
            build: Arc::new(BuildStage::new(store.clone(), builder, container)),
            deploy: Arc::new(DeployStage::new(store, controller)),
        }
    }

    pub fn executor(&self, stage: StageName) -> &Arc<dyn StageExecutor> {
        match stage {
            StageName::Source => &self.source,
            StageName::Test => &self.test,
            StageName::Build => &self.build,
            StageName::Deploy => &self.deploy,
        }
    }
}
