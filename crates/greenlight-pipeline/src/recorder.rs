//! Persists every published event to the run's event log.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use greenlight_core::EventBus;
use greenlight_state::StateStore;

/// Subscribe to `bus` and append each event to the store.
///
/// The task ends when every sender of the bus has been dropped. Events
/// missed because the recorder fell behind are logged and skipped.
pub fn spawn_event_recorder(bus: &EventBus, store: StateStore) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = store.append_event(&event) {
                        error!(run_id = %event.run_id, error = %e, "failed to record event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event recorder lagged");
                }
                Err(RecvError::Closed) => {
                    debug!("event bus closed, recorder stopping");
                    break;
                }
            }
        }
    })
}
