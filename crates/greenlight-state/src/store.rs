//! StateStore: redb-backed state persistence for Greenlight.
//!
//! Provides the content-addressed artifact store plus typed CRUD over
//! pipeline runs, rollout reports, the trigger ledger, and the event log.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use greenlight_core::{Artifact, Event, RolloutReport, sha256_hex};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const TARGETS_KEY: &str = "targets";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Tie-breaker for events recorded within the same millisecond.
    event_seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_db(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            event_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ARTIFACT_BLOBS).map_err(map_err!(Table))?;
        txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.open_table(ROLLOUTS).map_err(map_err!(Table))?;
        txn.open_table(TRIGGERS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.open_table(PENDING).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON records ───────────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        table_def: BytesTable,
        key: &str,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table_def: BytesTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All records whose key starts with `prefix` (empty prefix = all).
    fn scan_json<T: DeserializeOwned>(
        &self,
        table_def: BytesTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Artifacts ──────────────────────────────────────────────────

    /// Store an artifact's content. Write-once.
    ///
    /// Re-storing identical content from the same producer is a no-op;
    /// a different producer claiming an existing checksum is rejected.
    pub fn put_artifact(&self, artifact: &Artifact, content: &[u8]) -> StateResult<()> {
        if !artifact.verify(content) {
            return Err(StateError::Corrupt(format!(
                "{} declares {} but content hashes to {}",
                artifact.name,
                artifact.checksum,
                sha256_hex(content)
            )));
        }
        let meta = serde_json::to_vec(artifact).map_err(map_err!(Serialize))?;
        let key = artifact.checksum.as_str();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut metas = txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
            let existing: Option<Artifact> = match metas.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match existing {
                Some(prev) if prev.producer != artifact.producer => {
                    return Err(StateError::Conflict(format!(
                        "artifact {key} was produced by {}, not {}",
                        prev.producer, artifact.producer
                    )));
                }
                Some(_) => {
                    debug!(checksum = %key, "artifact already stored");
                }
                None => {
                    metas
                        .insert(key, meta.as_slice())
                        .map_err(map_err!(Write))?;
                    let mut blobs = txn.open_table(ARTIFACT_BLOBS).map_err(map_err!(Table))?;
                    blobs.insert(key, content).map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %artifact.name, checksum = %artifact.checksum, size = artifact.size, "artifact stored");
        Ok(())
    }

    /// Get artifact metadata by checksum.
    pub fn get_artifact(&self, checksum: &str) -> StateResult<Option<Artifact>> {
        self.get_json(ARTIFACTS, checksum)
    }

    /// Read an artifact's content, verifying it against the checksum.
    pub fn read_artifact(&self, artifact: &Artifact) -> StateResult<Vec<u8>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ARTIFACT_BLOBS).map_err(map_err!(Table))?;
        let content = match table.get(artifact.checksum.as_str()).map_err(map_err!(Read))? {
            Some(guard) => guard.value().to_vec(),
            None => return Err(StateError::NotFound(artifact.location.clone())),
        };
        if !artifact.verify(&content) {
            warn!(checksum = %artifact.checksum, "stored artifact failed verification");
            return Err(StateError::Corrupt(artifact.location.clone()));
        }
        Ok(content)
    }

    /// List all artifact metadata.
    pub fn list_artifacts(&self) -> StateResult<Vec<Artifact>> {
        self.scan_json(ARTIFACTS, "")
    }

    // ── Runs ───────────────────────────────────────────────────────

    /// Insert or update a pipeline run.
    pub fn put_run(&self, run: &PipelineRun) -> StateResult<()> {
        self.put_json(RUNS, &run.id, run)?;
        debug!(run_id = %run.id, status = ?run.status, "run stored");
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> StateResult<Option<PipelineRun>> {
        self.get_json(RUNS, run_id)
    }

    /// List all runs, oldest first.
    pub fn list_runs(&self) -> StateResult<Vec<PipelineRun>> {
        let mut runs: Vec<PipelineRun> = self.scan_json(RUNS, "")?;
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(runs)
    }

    // ── Rollouts ───────────────────────────────────────────────────

    /// Archive a terminal rollout report under its run id.
    pub fn put_rollout(&self, report: &RolloutReport) -> StateResult<()> {
        self.put_json(ROLLOUTS, &report.run_id, report)?;
        debug!(run_id = %report.run_id, status = %report.status, "rollout archived");
        Ok(())
    }

    pub fn get_rollout(&self, run_id: &str) -> StateResult<Option<RolloutReport>> {
        self.get_json(ROLLOUTS, run_id)
    }

    pub fn list_rollouts(&self) -> StateResult<Vec<RolloutReport>> {
        self.scan_json(ROLLOUTS, "")
    }

    // ── Trigger ledger ─────────────────────────────────────────────

    /// Claim an idempotency key for `run_id`.
    ///
    /// Check and insert happen in one write transaction, so concurrent
    /// deliveries of the same key see exactly one `New`.
    pub fn claim_trigger(&self, idempotency_key: &str, run_id: &str) -> StateResult<TriggerClaim> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let claim;
        {
            let mut table = txn.open_table(TRIGGERS).map_err(map_err!(Table))?;
            let existing = table
                .get(idempotency_key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_string());
            claim = match existing {
                Some(prev) => TriggerClaim::Duplicate(prev),
                None => {
                    table
                        .insert(idempotency_key, run_id)
                        .map_err(map_err!(Write))?;
                    TriggerClaim::New
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %idempotency_key, ?claim, "trigger claimed");
        Ok(claim)
    }

    /// Claim `idempotency_key` for `run` and queue the run, atomically.
    ///
    /// The key, the `Queued` run record and its place in the pending queue
    /// are written in one transaction: either all three exist or none do.
    /// Nothing is written when the key is taken or `capacity` runs are
    /// already pending.
    pub fn enqueue_run(
        &self,
        idempotency_key: &str,
        run: &PipelineRun,
        capacity: usize,
    ) -> StateResult<Enqueued> {
        let value = serde_json::to_vec(run).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut triggers = txn.open_table(TRIGGERS).map_err(map_err!(Table))?;
            let mut pending = txn.open_table(PENDING).map_err(map_err!(Table))?;
            let existing = triggers
                .get(idempotency_key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_string());
            let depth = pending.iter().map_err(map_err!(Read))?.count();
            let next_seq = pending
                .last()
                .map_err(map_err!(Read))?
                .map_or(0, |(seq, _)| seq.value() + 1);

            outcome = match existing {
                Some(prev) => Enqueued::Duplicate(prev),
                None if depth >= capacity => Enqueued::Full,
                None => {
                    triggers
                        .insert(idempotency_key, run.id.as_str())
                        .map_err(map_err!(Write))?;
                    pending
                        .insert(next_seq, run.id.as_str())
                        .map_err(map_err!(Write))?;
                    let mut runs = txn.open_table(RUNS).map_err(map_err!(Table))?;
                    runs.insert(run.id.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Enqueued::Queued
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(key = %idempotency_key, run_id = %run.id, ?outcome, "trigger enqueued");
        Ok(outcome)
    }

    /// Oldest pending run as `(sequence, run_id)`.
    pub fn next_pending(&self) -> StateResult<Option<(u64, String)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING).map_err(map_err!(Table))?;
        let first = table
            .first()
            .map_err(map_err!(Read))?
            .map(|(seq, run_id)| (seq.value(), run_id.value().to_string()));
        Ok(first)
    }

    /// Drop a pending entry once the worker has settled its run.
    pub fn remove_pending(&self, seq: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PENDING).map_err(map_err!(Table))?;
            table.remove(seq).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Number of runs waiting for the worker.
    pub fn pending_len(&self) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING).map_err(map_err!(Table))?;
        Ok(table.iter().map_err(map_err!(Read))?.count())
    }

    /// Run id that claimed an idempotency key.
    pub fn get_trigger(&self, idempotency_key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TRIGGERS).map_err(map_err!(Table))?;
        let run_id = table
            .get(idempotency_key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        Ok(run_id)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event to its run's log.
    pub fn append_event(&self, event: &Event) -> StateResult<()> {
        let seq = self.event_seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}:{:013}:{:08}", event.run_id, event.timestamp, seq);
        self.put_json(EVENTS, &key, event)
    }

    /// Events recorded for a run, in the order they happened.
    pub fn list_events_for_run(&self, run_id: &str) -> StateResult<Vec<Event>> {
        self.scan_json(EVENTS, &format!("{run_id}:"))
    }

    // ── Deployment targets ─────────────────────────────────────────

    pub fn put_targets(&self, targets: &TargetState) -> StateResult<()> {
        self.put_json(META, TARGETS_KEY, targets)
    }

    pub fn get_targets(&self) -> StateResult<Option<TargetState>> {
        self.get_json(META, TARGETS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_core::{
        Environment, RolloutStatus, SourceTrigger, StageName, WeightSplit,
    };

    fn test_run(key: &str, created_at: u64) -> PipelineRun {
        let trigger = SourceTrigger::new("r1", key).unwrap();
        PipelineRun::queued(trigger, created_at)
    }

    fn test_report(run_id: &str) -> RolloutReport {
        RolloutReport {
            run_id: run_id.to_string(),
            image: "img:r1".to_string(),
            target: Environment::Green,
            original_active: Environment::Blue,
            status: RolloutStatus::Completed,
            peak_weight: 100,
            final_split: WeightSplit::toward(Environment::Green, 100),
            shift_count: 10,
            failing_check: None,
            reason: None,
            started_at: 1000,
            finished_at: 2000,
        }
    }

    // ── Artifacts ──────────────────────────────────────────────────

    #[test]
    fn artifact_put_and_read() {
        let store = StateStore::open_in_memory().unwrap();
        let artifact = Artifact::describe("SourceArtifact", StageName::Source, b"tarball");

        store.put_artifact(&artifact, b"tarball").unwrap();

        assert_eq!(store.read_artifact(&artifact).unwrap(), b"tarball");
        assert_eq!(store.get_artifact(&artifact.checksum).unwrap(), Some(artifact));
    }

    #[test]
    fn artifact_rewrite_by_same_producer_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        let artifact = Artifact::describe("BuildArtifact", StageName::Build, b"descriptor");

        store.put_artifact(&artifact, b"descriptor").unwrap();
        store.put_artifact(&artifact, b"descriptor").unwrap();
        assert_eq!(store.list_artifacts().unwrap().len(), 1);
    }

    #[test]
    fn artifact_claimed_by_other_producer_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let original = Artifact::describe("SourceArtifact", StageName::Source, b"same");
        let imposter = Artifact::describe("BuildArtifact", StageName::Build, b"same");

        store.put_artifact(&original, b"same").unwrap();
        let err = store.put_artifact(&imposter, b"same").unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert_eq!(
            store.get_artifact(&original.checksum).unwrap().unwrap().producer,
            StageName::Source
        );
    }

    #[test]
    fn artifact_with_wrong_checksum_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let artifact = Artifact::describe("SourceArtifact", StageName::Source, b"declared");
        let err = store.put_artifact(&artifact, b"actual").unwrap_err();
        assert!(matches!(err, StateError::Corrupt(_)));
        assert!(store.list_artifacts().unwrap().is_empty());
    }

    #[test]
    fn reading_missing_artifact_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let artifact = Artifact::describe("SourceArtifact", StageName::Source, b"never stored");
        assert!(matches!(
            store.read_artifact(&artifact),
            Err(StateError::NotFound(_))
        ));
    }

    // ── Runs ───────────────────────────────────────────────────────

    #[test]
    fn run_put_get_and_update() {
        let store = StateStore::open_in_memory().unwrap();
        let mut run = test_run("key-1", 1000);
        store.put_run(&run).unwrap();

        run.status = RunStatus::Running;
        run.updated_at = 1500;
        store.put_run(&run).unwrap();

        let retrieved = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(retrieved.status, RunStatus::Running);
        assert_eq!(retrieved.updated_at, 1500);
    }

    #[test]
    fn runs_list_oldest_first() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_run(&test_run("key-b", 2000)).unwrap();
        store.put_run(&test_run("key-a", 1000)).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].created_at, 1000);
        assert_eq!(runs[1].created_at, 2000);
    }

    // ── Rollouts ───────────────────────────────────────────────────

    #[test]
    fn rollout_archive_roundtrip() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_rollout(&test_report("run-1")).unwrap();

        assert_eq!(store.get_rollout("run-1").unwrap(), Some(test_report("run-1")));
        assert!(store.get_rollout("run-2").unwrap().is_none());
        assert_eq!(store.list_rollouts().unwrap().len(), 1);
    }

    // ── Trigger ledger ─────────────────────────────────────────────

    #[test]
    fn trigger_claim_is_once_per_key() {
        let store = StateStore::open_in_memory().unwrap();

        assert_eq!(store.claim_trigger("key-1", "run-a").unwrap(), TriggerClaim::New);
        assert_eq!(
            store.claim_trigger("key-1", "run-b").unwrap(),
            TriggerClaim::Duplicate("run-a".to_string())
        );
        assert_eq!(store.claim_trigger("key-2", "run-c").unwrap(), TriggerClaim::New);
        assert_eq!(store.get_trigger("key-1").unwrap().as_deref(), Some("run-a"));
    }

    #[test]
    fn concurrent_trigger_claims_yield_one_winner() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.claim_trigger("same-key", &format!("run-{i}")).unwrap()
                })
            })
            .collect();
        let claims: Vec<TriggerClaim> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = claims.iter().filter(|c| **c == TriggerClaim::New).count();
        assert_eq!(winners, 1);
    }

    // ── Pending queue ──────────────────────────────────────────────

    #[test]
    fn enqueue_records_claim_run_and_queue_entry_together() {
        let store = StateStore::open_in_memory().unwrap();
        let run = test_run("key-1", 1000);

        assert_eq!(store.enqueue_run("key-1", &run, 4).unwrap(), Enqueued::Queued);
        assert_eq!(store.get_trigger("key-1").unwrap(), Some(run.id.clone()));
        assert_eq!(store.get_run(&run.id).unwrap().unwrap().status, RunStatus::Queued);
        assert_eq!(store.next_pending().unwrap(), Some((0, run.id.clone())));

        let replay = test_run("key-1", 2000);
        assert_eq!(
            store.enqueue_run("key-1", &replay, 4).unwrap(),
            Enqueued::Duplicate(run.id.clone())
        );
        assert_eq!(store.pending_len().unwrap(), 1);
    }

    #[test]
    fn full_queue_records_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let first = test_run("key-1", 1000);
        let second = test_run("key-2", 1001);

        store.enqueue_run("key-1", &first, 1).unwrap();
        assert_eq!(store.enqueue_run("key-2", &second, 1).unwrap(), Enqueued::Full);
        assert!(store.get_trigger("key-2").unwrap().is_none());
        assert!(store.get_run(&second.id).unwrap().is_none());

        store.remove_pending(0).unwrap();
        assert_eq!(store.enqueue_run("key-2", &second, 1).unwrap(), Enqueued::Queued);
    }

    #[test]
    fn pending_runs_come_out_in_arrival_order() {
        let store = StateStore::open_in_memory().unwrap();
        let runs: Vec<PipelineRun> = ["key-a", "key-b", "key-c"]
            .iter()
            .map(|key| test_run(key, 1000))
            .collect();
        for run in &runs {
            let key = &run.trigger.idempotency_key;
            store.enqueue_run(key, run, 8).unwrap();
        }

        let mut order = Vec::new();
        while let Some((seq, run_id)) = store.next_pending().unwrap() {
            order.push(run_id);
            store.remove_pending(seq).unwrap();
        }
        let expected: Vec<String> = runs.iter().map(|r| r.id.clone()).collect();
        assert_eq!(order, expected);
        assert_eq!(store.pending_len().unwrap(), 0);
    }

    // ── Events ─────────────────────────────────────────────────────

    #[test]
    fn events_listed_per_run_in_order() {
        let store = StateStore::open_in_memory().unwrap();
        let mut first = Event::stage("run-1", StageName::Source, "running");
        first.timestamp = 10;
        let mut second = Event::stage("run-1", StageName::Source, "succeeded");
        second.timestamp = 10;
        let mut other = Event::stage("run-2", StageName::Source, "running");
        other.timestamp = 5;

        store.append_event(&first).unwrap();
        store.append_event(&other).unwrap();
        store.append_event(&second).unwrap();

        let events = store.list_events_for_run("run-1").unwrap();
        assert_eq!(events, vec![first, second]);
    }

    // ── Targets ────────────────────────────────────────────────────

    #[test]
    fn targets_roundtrip() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_targets().unwrap().is_none());

        let targets = TargetState {
            active: Environment::Green,
            updated_at: 42,
        };
        store.put_targets(&targets).unwrap();
        assert_eq!(store.get_targets().unwrap(), Some(targets));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let artifact = Artifact::describe("SourceArtifact", StageName::Source, b"persisted");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_artifact(&artifact, b"persisted").unwrap();
            store.claim_trigger("key-1", "run-a").unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.read_artifact(&artifact).unwrap(), b"persisted");
        assert_eq!(
            store.claim_trigger("key-1", "run-z").unwrap(),
            TriggerClaim::Duplicate("run-a".to_string())
        );
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_runs().unwrap().is_empty());
        assert!(store.list_rollouts().unwrap().is_empty());
        assert!(store.list_artifacts().unwrap().is_empty());
        assert!(store.list_events_for_run("any").unwrap().is_empty());
        assert!(store.get_run("nope").unwrap().is_none());
        assert!(store.get_trigger("nope").unwrap().is_none());
    }
}
