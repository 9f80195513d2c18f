//! greenlight-state — embedded state store for Greenlight.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the artifact store, pipeline runs, archived rollouts, the
//! trigger idempotency ledger, the per-run event log, and the last known
//! deployment target assignment.
//!
//! # Architecture
//!
//! Artifact content is stored raw, keyed by its SHA-256 checksum, next to
//! a JSON metadata record. Everything else is JSON-serialized into redb's
//! `&[u8]` value columns. Composite keys (`{run_id}:{timestamp}:{seq}`)
//! enable prefix scans over a run's events.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. redb serializes write
//! transactions, which is what makes artifact writes and trigger claims
//! atomic.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
