//! greenlight-core — shared vocabulary for the Greenlight delivery pipeline.
//!
//! Everything that more than one crate needs to agree on lives here:
//! stage names, artifacts, environments and weight splits, rollout
//! reports, the versioned deployment descriptor, source triggers, the
//! `greenlight.toml` configuration surface, observability events, and the
//! shell hook runner shared by the command-backed collaborators.

pub mod config;
pub mod descriptor;
pub mod events;
pub mod shell;
pub mod trigger;
pub mod types;

pub use config::{ConfigError, GreenlightConfig, duration_field, parse_duration};
pub use descriptor::{DeploymentDescriptor, DeploymentRevision, DescriptorError, ImageRef};
pub use events::{Event, EventBus, EventSubject};
pub use shell::{ShellError, ShellOutput, run_shell};
pub use trigger::{SourceRef, SourceTrigger, TriggerError};
pub use types::*;
