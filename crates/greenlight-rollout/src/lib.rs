//! Greenlight blue/green rollouts: target model, linear traffic shifting,
//! health-gated rollback.
//!
//! This crate owns the single mutable fact of a blue/green fleet (which
//! environment is live) and the state machine that moves production
//! traffic from one environment to the other.
//!
//! # Components
//!
//! - **`environment`**: Deployment Target Model (active indicator + idle weight)
//! - **`config`**: Shift cadence, increment, timeouts and named linear presets
//! - **`machine`**: Pure rollout state machine (event in, commands out)
//! - **`backend`**: Seam to the infrastructure that stages and weights environments
//! - **`controller`**: Async driver: event queue over ticks, health results, cancellation

pub mod backend;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod machine;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{CommandBackend, DeploymentBackend};
pub use config::{LinearPreset, ShiftConfig};
pub use controller::TrafficShiftController;
pub use environment::{DeploymentTargets, TargetModel};
pub use error::{BackendError, RolloutError, RolloutResult};
pub use machine::{Rollout, RolloutCommand, RolloutEvent};
