// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Compass Jury Server
//!
//! The `compass-jury` binary wires the core pipeline into a long-running
//! HTTP service: configuration from the environment, lifecycle reporting to
//! the Station, heartbeat and metrics loops, the session reaper, and
//! graceful shutdown (SIGTERM → DRAINING → TERMINATED).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use compass_core::application::jury::JuryService;
use compass_core::application::lifecycle::{
    LifecycleManager, LifecycleState, TransitionObserver,
};
use compass_core::application::memory_service::MemoryService;
use compass_core::domain::config::JuryConfig;
use compass_core::domain::router::ChatBackend;
use compass_core::infrastructure::router_client::ModelRouterClient;
use compass_core::infrastructure::station::{
    self, HeartbeatMode, HeartbeatStatus, StationClient,
};
use compass_core::infrastructure::telemetry::{self, Telemetry};
use compass_core::presentation::api::{self, AppState};

const AGENT_NAME: &str = "compass-jury";

/// Cadence of the idle-session reaper.
const SESSION_REAPER_INTERVAL: Duration = Duration::from_secs(300);

/// Compass AI Jury - multi-model consensus over the Model Router
#[derive(Parser)]
#[command(name = "compass-jury")]
#[command(version, about, long_about = None)]
struct Cli {
    /// HTTP port
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// HTTP bind address
    #[arg(long, env = "COMPASS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COMPASS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = JuryConfig::from_env().context("failed to load configuration")?;
    info!(
        models = ?config.models,
        reflection = config.enable_reflection,
        memory = config.enable_memory,
        guardrails = config.enable_guardrails,
        "configuration loaded"
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    telemetry::register_counters();

    let telemetry = Arc::new(Telemetry::new());
    let router = Arc::new(ModelRouterClient::new(
        &config.model_router_url,
        &config.model_router_token,
        &config.agent_id,
    ));
    let memory = Arc::new(MemoryService::new(config.session_ttl.as_secs()));
    let backend: Arc<dyn ChatBackend> = router.clone();
    let jury = Arc::new(JuryService::new(
        backend,
        memory.clone(),
        telemetry.clone(),
        &config,
    ));

    let station = config.station_url.as_ref().map(|url| {
        Arc::new(StationClient::new(
            url,
            config.collector_url.clone(),
            &config.agent_id,
            config.agent_key.clone(),
            AGENT_NAME,
        ))
    });
    let observer = station
        .clone()
        .map(|s| s as Arc<dyn TransitionObserver>);
    let lifecycle = Arc::new(LifecycleManager::new(observer));
    let heartbeat = Arc::new(HeartbeatStatus::new(HeartbeatMode::Idle));

    lifecycle
        .transition(LifecycleState::Provisioned, "configuration loaded")
        .await?;

    let cancel = CancellationToken::new();

    if let Some(station) = &station {
        tokio::spawn(station::run_heartbeat_loop(
            station.clone(),
            heartbeat.clone(),
            telemetry.clone(),
            cancel.clone(),
        ));
        tokio::spawn(station::run_metrics_loop(
            station.clone(),
            telemetry.clone(),
            cancel.clone(),
        ));
    } else {
        warn!("PAP_STATION_URL not set, control-plane reporting disabled");
    }

    {
        let memory = memory.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(SESSION_REAPER_INTERVAL) => {
                        memory.cleanup_expired();
                    }
                }
            }
        });
    }

    let state = Arc::new(AppState {
        jury,
        memory,
        lifecycle: lifecycle.clone(),
        heartbeat,
        telemetry,
        prometheus,
        router,
        configured_models: config.models.clone(),
    });
    let app = api::app(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "compass jury agent listening");

    lifecycle
        .transition(LifecycleState::Active, "server listening")
        .await?;

    let shutdown = {
        let lifecycle = lifecycle.clone();
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining");
            if let Err(err) = lifecycle
                .transition(LifecycleState::Draining, "shutdown signal")
                .await
            {
                warn!(%err, "could not enter DRAINING");
            }
            cancel.cancel();
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    match served {
        Ok(()) => {
            if let Err(err) = lifecycle
                .transition(LifecycleState::Terminated, "server stopped")
                .await
            {
                warn!(%err, "could not enter TERMINATED");
            }
            info!("compass jury agent stopped");
            Ok(())
        }
        Err(err) => {
            // The error path: report KILLED before bailing out.
            if let Err(lerr) = lifecycle
                .transition(LifecycleState::Killed, &format!("server error: {err}"))
                .await
            {
                warn!(%lerr, "could not enter KILLED");
            }
            Err(err).context("server error")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
