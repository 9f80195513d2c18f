//! Assembles the pipeline from `greenlight.toml`.
//!
//! Everything external is command- or HTTP-backed here: the build and test
//! hooks, the deployment backend hooks, and the per-environment health
//! probes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use greenlight_core::{Environment, EventBus, GreenlightConfig};
use greenlight_health::HttpHealthMonitor;
use greenlight_pipeline::{
    CommandBuildService, CommandTestRunner, ContainerSpec, PipelineEngine, Stages,
};
use greenlight_rollout::{
    CommandBackend, DeploymentBackend, ShiftConfig, TargetModel, TrafficShiftController,
};
use greenlight_state::StateStore;

const STORE_FILE: &str = "greenlight.redb";

/// The assembled long-lived parts of the daemon.
pub struct Components {
    pub store: StateStore,
    pub events: EventBus,
    pub backend: Arc<dyn DeploymentBackend>,
    pub controller: Arc<TrafficShiftController>,
    pub engine: Arc<PipelineEngine>,
}

/// Open (or create) the state store under `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let path = data_dir.join(STORE_FILE);
    let store = StateStore::open(&path).with_context(|| format!("opening {}", path.display()))?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

/// Last persisted active environment, or the configured initial one.
pub fn restore_active(store: &StateStore, initial: Environment) -> anyhow::Result<Environment> {
    Ok(match store.get_targets()? {
        Some(targets) => {
            info!(active = %targets.active, "deployment targets restored");
            targets.active
        }
        None => initial,
    })
}

/// Wire every collaborator named in `config` around `store`.
pub fn assemble(config: &GreenlightConfig, store: StateStore) -> anyhow::Result<Components> {
    let shift = ShiftConfig::from_config(&config.rollout)?;
    let active = restore_active(&store, config.service.initial_active)?;
    let events = EventBus::default();

    let monitor = Arc::new(
        HttpHealthMonitor::from_config(&config.health).with_probe_timeout(shift.health_check_timeout()),
    );
    let backend: Arc<dyn DeploymentBackend> =
        Arc::new(CommandBackend::from_config(&config.backend, shift.staging_timeout()));
    let builder = CommandBuildService::from_config(&config.build)?
        .ok_or_else(|| anyhow!("build.build_command is required"))?;
    let runner = CommandTestRunner::from_config(&config.build)?
        .ok_or_else(|| anyhow!("build.test_command is required"))?;

    let controller = Arc::new(TrafficShiftController::new(
        shift,
        TargetModel::new(active),
        monitor,
        backend.clone(),
        events.clone(),
    ));
    let stages = Stages::standard(
        store.clone(),
        Arc::new(runner),
        Arc::new(builder),
        ContainerSpec::from(&config.build),
        controller.clone(),
    );
    let engine = Arc::new(PipelineEngine::new(store.clone(), events.clone(), stages));

    info!(
        service = %config.service.name,
        active = %active,
        increment = shift.increment_percent(),
        interval_ms = shift.interval().as_millis() as u64,
        "pipeline assembled"
    );
    Ok(Components {
        store,
        events,
        backend,
        controller,
        engine,
    })
}

/// Push the steady split for the restored active environment to the
/// backend. A rollout interrupted by a restart may have left traffic split.
pub async fn reconcile_weights(components: &Components) {
    let split = components.controller.targets().snapshot().split();
    match components.backend.apply_weights(split).await {
        Ok(()) => info!(%split, "traffic weights reconciled"),
        Err(e) => warn!(%split, error = %e, "failed to reconcile traffic weights"),
    }
}
