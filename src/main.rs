//! # Incident Monitor Entry Point
//!
//! Loads configuration, opens the cache, wires the monitor and serves the
//! control API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use incident_monitor::{
    config::ConfigLoader,
    db,
    monitor::IncidentMonitor,
    notifications::DesktopAlertSink,
    remote::PagerDutyClient,
    repositories::CacheStore,
    secrets::{API_KEY_SECRET, InMemorySecretStore, SecretStore},
    server::{AppState, run_server},
    telemetry,
};

#[derive(Parser)]
#[command(name = "incident-monitor")]
#[command(about = "Watch remote incidents and raise desktop notifications")]
#[command(version)]
struct Cli {
    /// Directory holding the layered `.env` files
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// Do not start the control API; run until Ctrl-C
    #[arg(long)]
    no_server: bool,
    /// Do not start background polling at launch
    #[arg(long)]
    no_poll: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match cli.base_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("Failed to load configuration")?;

    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = db::init_and_migrate(&config).await?;
    let cache = CacheStore::new(db.clone());
    let cleared = cache.incidents.clear_incidents().await?;
    tracing::debug!(cleared, "Cleared incident cache from previous run");

    let secrets = Arc::new(InMemorySecretStore::new());
    if let Some(api_key) = config.api_key.as_deref().map(str::trim)
        && !api_key.is_empty()
    {
        secrets.set(API_KEY_SECRET, api_key).await?;
    }

    let source = Arc::new(PagerDutyClient::from_config(&config, secrets.clone())?);
    let sink = Arc::new(DesktopAlertSink::new(config.sounds_dir.clone()));
    let (monitor, queues) = IncidentMonitor::new(&config, cache, source, sink, secrets);
    let monitor = Arc::new(monitor);

    let shutdown = CancellationToken::new();
    let workers = queues.spawn(shutdown.clone());

    if !cli.no_poll {
        monitor.start_polling().await;
    }

    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        })
    };

    if cli.no_server {
        shutdown.cancelled().await;
    } else {
        let state = AppState {
            config: Arc::new(config),
            db,
            monitor: monitor.clone(),
        };
        if let Err(err) = run_server(state, shutdown.clone()).await {
            shutdown.cancel();
            anyhow::bail!("Control API failed: {}", err);
        }
    }

    ctrl_c.abort();
    monitor.stop_polling().await;
    workers.shutdown().await;
    tracing::info!("Incident monitor stopped");
    Ok(())
}
