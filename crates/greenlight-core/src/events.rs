//! Observability events, one per stage transition and per rollout
//! state transition.
//!
//! Events are published on a broadcast channel and are never read back
//! by the pipeline itself; subscribers (the run recorder, the API) only
//! observe them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::types::{RolloutStatus, RunId, StageName, epoch_millis};

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum EventSubject {
    Stage(StageName),
    Rollout(RolloutStatus),
}

/// A single status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    pub subject: EventSubject,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    /// Outcome label, e.g. `running`, `succeeded`, `failed`, `entered`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Event {
    pub fn stage(run_id: &str, stage: StageName, outcome: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            subject: EventSubject::Stage(stage),
            timestamp: epoch_millis(),
            outcome: outcome.to_string(),
            detail: None,
        }
    }

    pub fn rollout(run_id: &str, status: RolloutStatus, outcome: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            subject: EventSubject::Rollout(status),
            timestamp: epoch_millis(),
            outcome: outcome.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Name of the stage or rollout state.
    pub fn subject_name(&self) -> &'static str {
        match self.subject {
            EventSubject::Stage(stage) => stage.as_str(),
            EventSubject::Rollout(status) => status.as_str(),
        }
    }
}

/// Fan-out channel for [`Event`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Log and publish an event. Publishing with no subscribers is fine.
    pub fn emit(&self, event: Event) {
        info!(
            run_id = %event.run_id,
            subject = event.subject_name(),
            outcome = %event.outcome,
            detail = event.detail.as_deref().unwrap_or(""),
            "status transition"
        );
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(Event::stage("run-1", StageName::Source, "running"));
        bus.emit(Event::stage("run-1", StageName::Source, "succeeded"));

        assert_eq!(rx.recv().await.unwrap().outcome, "running");
        assert_eq!(rx.recv().await.unwrap().outcome, "succeeded");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(Event::rollout("run-1", RolloutStatus::Staging, "entered"));
    }

    #[test]
    fn subject_serializes_tagged() {
        let event = Event::rollout("run-1", RolloutStatus::Shifting, "entered").with_detail("w=10");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["subject"]["kind"], "rollout");
        assert_eq!(json["subject"]["name"], "shifting");
        assert_eq!(event.subject_name(), "Shifting");
    }
}
