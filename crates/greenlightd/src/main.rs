//! greenlightd — the Greenlight daemon.
//!
//! Single binary that assembles the delivery pipeline:
//! - State store (redb)
//! - Trigger queue + pipeline worker
//! - Build/test hooks
//! - Traffic shift controller with HTTP health probes
//! - REST API
//!
//! # Usage
//!
//! ```text
//! greenlightd serve --config greenlight.toml --data-dir /var/lib/greenlight --port 8080
//! greenlightd run --revision main@4f2a9c1 --key manual-1
//! greenlightd validate --config greenlight.toml
//! ```

mod wiring;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use greenlight_api::ApiState;
use greenlight_core::{GreenlightConfig, SourceTrigger};
use greenlight_pipeline::spawn_event_recorder;
use greenlight_rollout::ShiftConfig;
use greenlight_state::{RunStatus, TriggerClaim};

const DEFAULT_FILTER: &str = "info,greenlightd=debug,greenlight=debug";

#[derive(Parser)]
#[command(name = "greenlightd", about = "Greenlight delivery pipeline daemon")]
struct Cli {
    /// Path to greenlight.toml.
    #[arg(long, global = true, default_value = "greenlight.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and process triggers until interrupted.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = ".greenlight")]
        data_dir: PathBuf,
    },
    /// Run the pipeline once for a revision and exit.
    Run {
        /// Source revision to build and deploy.
        #[arg(long)]
        revision: String,

        /// Idempotency key; replays of a key return the earlier run.
        #[arg(long)]
        key: String,

        /// Data directory for persistent state.
        #[arg(long, default_value = ".greenlight")]
        data_dir: PathBuf,
    },
    /// Check greenlight.toml and print the resolved rollout cadence.
    Validate,
    /// Write a starter greenlight.toml.
    Init {
        /// Service name.
        #[arg(long)]
        name: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve { port, data_dir } => serve(&cli.config, port, &data_dir).await,
        Command::Run {
            revision,
            key,
            data_dir,
        } => run_once(&cli.config, &revision, &key, &data_dir).await,
        Command::Validate => validate(&cli.config),
        Command::Init { name } => init(&cli.config, &name),
    }
}

fn load_config(path: &Path) -> anyhow::Result<GreenlightConfig> {
    GreenlightConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

async fn serve(config_path: &Path, port: u16, data_dir: &Path) -> anyhow::Result<()> {
    info!("Greenlight daemon starting");
    let config = load_config(config_path)?;

    // ── Initialize subsystems ──────────────────────────────────

    let store = wiring::open_store(data_dir)?;
    let components = wiring::assemble(&config, store)?;
    wiring::reconcile_weights(&components).await;

    let recorder = spawn_event_recorder(&components.events, components.store.clone());
    let (queue, worker) = greenlight_pipeline::channel(
        components.store.clone(),
        components.engine.clone(),
        config.pipeline.queue_capacity,
    );

    // ── Start background tasks ─────────────────────────────────

    queue.recover()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = greenlight_api::build_router(ApiState {
        store: components.store.clone(),
        queue,
        controller: components.controller.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let controller = components.controller.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            // Reverse any rollout in flight and refuse the ones a run still
            // in Source, Test or Build would start.
            controller.shutdown();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker_handle.await;
    recorder.abort();
    info!("Greenlight daemon stopped");
    Ok(())
}

async fn run_once(config_path: &Path, revision: &str, key: &str, data_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let trigger = SourceTrigger::new(revision, key)?;
    let trigger = match &config.service.repository {
        Some(repository) => trigger.with_repository(repository),
        None => trigger,
    };

    let store = wiring::open_store(data_dir)?;
    let components = wiring::assemble(&config, store)?;
    let recorder = spawn_event_recorder(&components.events, components.store.clone());

    let run_id = trigger.run_id();
    let run = match components.store.claim_trigger(&trigger.idempotency_key, &run_id)? {
        TriggerClaim::Duplicate(existing) => {
            info!(run_id = %existing, "idempotency key already used");
            components
                .store
                .get_run(&existing)?
                .with_context(|| format!("run {existing} claimed but not recorded"))?
        }
        TriggerClaim::New => components.engine.run(&trigger).await?,
    };
    recorder.abort();

    println!("{}", serde_json::to_string_pretty(&run)?);
    match (run.status, run.failure()) {
        (RunStatus::Failed, Some((stage, reason))) => bail!("run {} failed at {stage}: {reason}", run.id),
        (RunStatus::Succeeded, _) => Ok(()),
        (status, _) => bail!("run {} ended {status:?}", run.id),
    }
}

fn validate(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let shift = ShiftConfig::from_config(&config.rollout)?;
    let stages: Vec<String> = config
        .declared_stages()?
        .iter()
        .map(|s| s.to_string())
        .collect();

    println!("service:  {}", config.service.name);
    println!("stages:   {}", stages.join(" → "));
    println!(
        "rollout:  {}% every {:?} ({} steps)",
        shift.increment_percent(),
        shift.interval(),
        shift.steps()
    );
    println!(
        "timeouts: staging {:?}, health check {:?}",
        shift.staging_timeout(),
        shift.health_check_timeout()
    );
    if config.build.build_command.is_none() || config.build.test_command.is_none() {
        bail!("build.build_command and build.test_command are required to serve");
    }
    println!("{} is valid", config_path.display());
    Ok(())
}

fn init(config_path: &Path, name: &str) -> anyhow::Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    let content = GreenlightConfig::scaffold(name).to_toml_string()?;
    std::fs::write(config_path, content)
        .with_context(|| format!("writing {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(())
}
