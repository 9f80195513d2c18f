//! greenlight-health — the Health Monitor collaborator.
//!
//! The traffic-shift controller asks one question of this crate: is a
//! given environment healthy right now? Answers are `Healthy`,
//! `Unhealthy`, or `Unreachable`, and a monitor that does not answer
//! within its bound is `Unreachable`.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor (trait)
//!   ├── HttpHealthMonitor → http_probe() per environment endpoint
//!   ├── check_with_timeout() → bounded wait, timeout = Unreachable
//!   └── wait_until_ready() → staging readiness gate with deadline
//! ```

pub mod checker;
pub mod monitor;
pub mod readiness;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checker::{ProbeResult, http_probe};
pub use monitor::{HealthMonitor, HttpHealthMonitor, check_with_timeout};
pub use readiness::{ReadinessError, ReadinessGate, wait_until_ready};
