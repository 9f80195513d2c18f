//! redb table definitions for the Greenlight state store.

use redb::TableDefinition;

/// Table of JSON (or raw) byte values keyed by string.
pub type BytesTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Raw artifact content keyed by SHA-256 checksum.
pub const ARTIFACT_BLOBS: BytesTable = TableDefinition::new("artifact_blobs");

/// Artifact metadata keyed by SHA-256 checksum.
pub const ARTIFACTS: BytesTable = TableDefinition::new("artifacts");

/// Pipeline runs keyed by run id.
pub const RUNS: BytesTable = TableDefinition::new("runs");

/// Archived rollout reports keyed by run id.
pub const ROLLOUTS: BytesTable = TableDefinition::new("rollouts");

/// Idempotency key → run id.
pub const TRIGGERS: TableDefinition<&str, &str> = TableDefinition::new("triggers");

/// Observability events keyed by `{run_id}:{timestamp}:{seq}`.
pub const EVENTS: BytesTable = TableDefinition::new("events");

/// Singleton records keyed by name (e.g. `targets`).
pub const META: BytesTable = TableDefinition::new("meta");

/// Runs waiting for the worker: arrival sequence → run id.
pub const PENDING: TableDefinition<u64, &str> = TableDefinition::new("pending");
