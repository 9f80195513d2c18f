//! Fake collaborators and a fully wired in-memory pipeline for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenlight_core::{BoxFuture, Environment, EventBus, HealthVerdict, ImageRef, SourceRef};
use greenlight_health::testing::ScriptedMonitor;
use greenlight_rollout::testing::RecordingBackend;
use greenlight_rollout::{ShiftConfig, TargetModel, TrafficShiftController};
use greenlight_state::StateStore;

use crate::engine::PipelineEngine;
use crate::error::StageFailure;
use crate::services::{BuildService, TestRunner};
use crate::stages::{ContainerSpec, Stages};

/// Build service that returns a fixed image or a fixed failure.
pub struct FakeBuildService {
    outcome: Result<String, String>,
    calls: AtomicU32,
    last_revision: Mutex<Option<String>>,
}

impl FakeBuildService {
    pub fn succeeding(image: &str) -> Self {
        Self::with_outcome(Ok(image.to_string()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with_outcome(Err(reason.to_string()))
    }

    fn with_outcome(outcome: Result<String, String>) -> Self {
        Self {
            outcome,
            calls: AtomicU32::new(0),
            last_revision: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_revision(&self) -> Option<String> {
        self.last_revision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl BuildService for FakeBuildService {
    fn build<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<ImageRef, StageFailure>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self
                .last_revision
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(source.revision.clone());
            match &self.outcome {
                Ok(image) => ImageRef::parse(image).map_err(|e| StageFailure::Build(e.to_string())),
                Err(reason) => Err(StageFailure::Build(reason.clone())),
            }
        })
    }
}

/// Test runner that passes or fails every time.
pub struct FakeTestRunner {
    failure: Option<String>,
    calls: AtomicU32,
}

impl FakeTestRunner {
    pub fn passing() -> Self {
        Self {
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TestRunner for FakeTestRunner {
    fn run_tests<'a>(&'a self, _source: &'a SourceRef) -> BoxFuture<'a, Result<(), StageFailure>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(reason) => Err(StageFailure::Test(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

/// Shift config used by the harness: 10% every minute, 30s staging budget.
pub fn test_shift_config() -> ShiftConfig {
    ShiftConfig::default()
        .with_staging_timeout(Duration::from_secs(30))
        .and_then(|c| c.with_readiness_poll_interval(Duration::from_secs(5)))
        .unwrap_or_default()
}

/// An in-memory pipeline with every external collaborator faked.
///
/// The monitor answers `Healthy` unless scripted otherwise; blue is active.
pub struct Harness {
    pub store: StateStore,
    pub events: EventBus,
    pub monitor: Arc<ScriptedMonitor>,
    pub backend: Arc<RecordingBackend>,
    pub builder: Arc<FakeBuildService>,
    pub tests: Arc<FakeTestRunner>,
    pub controller: Arc<TrafficShiftController>,
    pub stages: Stages,
    pub engine: Arc<PipelineEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(
            FakeBuildService::succeeding("registry.example.com/web:r1"),
            FakeTestRunner::passing(),
            RecordingBackend::new(),
        )
    }

    pub fn with_parts(builder: FakeBuildService, tests: FakeTestRunner, backend: RecordingBackend) -> Self {
        let store = match StateStore::open_in_memory() {
            Ok(store) => store,
            Err(e) => panic!("in-memory store: {e}"),
        };
        let events = EventBus::new(256);
        let monitor = Arc::new(ScriptedMonitor::new(HealthVerdict::Healthy));
        let backend = Arc::new(backend);
        let builder = Arc::new(builder);
        let tests = Arc::new(tests);

        let controller = Arc::new(TrafficShiftController::new(
            test_shift_config(),
            TargetModel::new(Environment::Blue),
            monitor.clone(),
            backend.clone(),
            events.clone(),
        ));
        let stages = Stages::standard(
            store.clone(),
            tests.clone(),
            builder.clone(),
            ContainerSpec {
                name: "web".to_string(),
                port: 8080,
                cpu_units: 256,
                memory_mib: 512,
            },
            controller.clone(),
        );
        let engine = Arc::new(PipelineEngine::new(store.clone(), events.clone(), stages.clone()));

        Self {
            store,
            events,
            monitor,
            backend,
            builder,
            tests,
            controller,
            stages,
            engine,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
