//! Source triggers: the change events that start a pipeline run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RunId, sha256_hex};

/// A source-change event carrying a revision and an idempotency key.
///
/// Webhook deliveries are at-least-once; the idempotency key identifies
/// a delivery so that replays coalesce onto the run the first one started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrigger {
    /// Revision identifier, e.g. a commit SHA or `refs/heads/main@abc123`.
    pub revision: String,
    /// Delivery identifier supplied by the source.
    pub idempotency_key: String,
    /// Optional repository the revision belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger revision must not be empty")]
    EmptyRevision,
    #[error("trigger idempotency key must not be empty")]
    EmptyIdempotencyKey,
    #[error("trigger field contains whitespace: {0}")]
    Whitespace(&'static str),
}

impl SourceTrigger {
    /// Build and validate a trigger.
    pub fn new(revision: &str, idempotency_key: &str) -> Result<Self, TriggerError> {
        let trigger = Self {
            revision: revision.to_string(),
            idempotency_key: idempotency_key.to_string(),
            repository: None,
        };
        trigger.validate()?;
        Ok(trigger)
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = Some(repository.to_string());
        self
    }

    /// Check that the trigger carries a usable revision and key.
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.revision.trim().is_empty() {
            return Err(TriggerError::EmptyRevision);
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(TriggerError::EmptyIdempotencyKey);
        }
        if self.revision.chars().any(char::is_whitespace) {
            return Err(TriggerError::Whitespace("revision"));
        }
        Ok(())
    }

    /// Deterministic run id for this delivery.
    ///
    /// Derived from the idempotency key so that every replay of the same
    /// delivery names the same run.
    pub fn run_id(&self) -> RunId {
        let digest = sha256_hex(self.idempotency_key.as_bytes());
        format!("run-{}", &digest[..12])
    }

    /// Short revision label used for image tags and log fields.
    pub fn short_revision(&self) -> &str {
        short_revision(&self.revision)
    }

    /// The source snapshot this trigger points at.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            revision: self.revision.clone(),
            repository: self.repository.clone(),
        }
    }
}

/// What the Source stage hands to Test and Build: the revision to check
/// out and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl SourceRef {
    pub fn short_revision(&self) -> &str {
        short_revision(&self.revision)
    }
}

fn short_revision(revision: &str) -> &str {
    let rev = revision
        .rsplit_once('@')
        .map(|(_, sha)| sha)
        .unwrap_or(revision);
    match rev.char_indices().nth(12) {
        Some((end, _)) => &rev[..end],
        None => rev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_stable_per_key() {
        let a = SourceTrigger::new("r1", "delivery-1").unwrap();
        let b = SourceTrigger::new("r2", "delivery-1").unwrap();
        let c = SourceTrigger::new("r1", "delivery-2").unwrap();
        assert_eq!(a.run_id(), b.run_id());
        assert_ne!(a.run_id(), c.run_id());
        assert!(a.run_id().starts_with("run-"));
        assert_eq!(a.run_id().len(), 16);
    }

    #[test]
    fn rejects_empty_fields() {
        assert_eq!(SourceTrigger::new("", "k"), Err(TriggerError::EmptyRevision));
        assert_eq!(
            SourceTrigger::new("r1", "  "),
            Err(TriggerError::EmptyIdempotencyKey)
        );
        assert_eq!(
            SourceTrigger::new("r 1", "k"),
            Err(TriggerError::Whitespace("revision"))
        );
    }

    #[test]
    fn short_revision_strips_ref_prefix() {
        let t = SourceTrigger::new("refs/heads/main@0123456789abcdef", "k").unwrap();
        assert_eq!(t.short_revision(), "0123456789ab");
        let t = SourceTrigger::new("r1", "k").unwrap();
        assert_eq!(t.short_revision(), "r1");
    }

    #[test]
    fn source_ref_carries_revision_and_repository() {
        let t = SourceTrigger::new("main@0123456789abcdef", "k")
            .unwrap()
            .with_repository("git@example.com:acme/frontend.git");
        let source = t.source_ref();
        assert_eq!(source.short_revision(), "0123456789ab");
        assert_eq!(source.repository.as_deref(), Some("git@example.com:acme/frontend.git"));
    }
}
