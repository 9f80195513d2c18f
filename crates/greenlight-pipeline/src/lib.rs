//! greenlight-pipeline — the four-stage delivery pipeline.
//!
//! Turns source triggers into deployed revisions. The pipeline:
//!
//! - Deduplicates triggers by idempotency key and queues them FIFO
//! - Runs Source → Test → Build → Deploy, one run at a time
//! - Hands artifacts between stages only through the content-addressed store
//! - Delegates the Deploy stage to the traffic shift controller
//! - Records every stage transition in the run's event log
//!
//! # Architecture
//!
//! ```text
//! TriggerQueue ──store (pending)──▶ PipelineWorker
//!                            └── PipelineEngine
//!                                  ├── StateStore (runs, artifacts)
//!                                  └── Stages
//!                                        ├── SourceStage
//!                                        ├── TestStage  ── TestRunner
//!                                        ├── BuildStage ── BuildService
//!                                        └── DeployStage ── TrafficShiftController
//! ```

pub mod engine;
pub mod error;
pub mod queue;
pub mod recorder;
pub mod services;
pub mod stage;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::PipelineEngine;
pub use error::{PipelineError, PipelineResult, StageFailure};
pub use queue::{PipelineWorker, Submission, TriggerQueue, channel};
pub use recorder::spawn_event_recorder;
pub use services::{BuildService, CommandBuildService, CommandTestRunner, TestRunner};
pub use stage::{PIPELINE, StageContext, StageExecutor, StageSpec};
pub use stages::{BuildStage, ContainerSpec, DeployStage, SourceStage, Stages, TestStage};
