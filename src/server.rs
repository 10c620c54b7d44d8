//! Server lifecycle: the WebSocket front end and the monitoring endpoint share
//! one shutdown signal.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::routes::{create_router, AppState};
use crate::config::Settings;
use crate::connections::ConnectionManager;
use crate::monitoring::{self, MonitoringState, ServiceMonitor, SystemSampler};
use crate::tts;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Serve the WebSocket router on `listener` until `shutdown` resolves.
pub async fn serve_websocket<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("WebSocket server failed")
}

/// Serve the monitoring router on `listener` until `shutdown` resolves.
pub async fn serve_monitoring<F>(
    listener: TcpListener,
    state: Arc<MonitoringState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, monitoring::create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Monitoring server failed")
}

/// Build the backend, bind both ports and run until Ctrl-C or SIGTERM.
pub async fn run(settings: Settings) -> Result<()> {
    let backend_settings = settings.clone();
    let backend = tokio::task::spawn_blocking(move || tts::build_backend(&backend_settings))
        .await
        .context("Backend initialisation panicked")?
        .with_context(|| format!("Failed to initialise {} backend", settings.backend))?;

    let monitor = Arc::new(ServiceMonitor::new());
    let connections = Arc::new(ConnectionManager::new(settings.max_connections));

    let monitoring_state = Arc::new(MonitoringState {
        monitor: Arc::clone(&monitor),
        connections: Arc::clone(&connections),
        system: SystemSampler::new(),
        backend: backend.name(),
        host: settings.monitoring_host.clone(),
        port: settings.monitoring_port,
    });

    let ws_addr = settings.ws_addr();
    let monitoring_addr = settings.monitoring_addr();

    let ws_listener = TcpListener::bind(&ws_addr)
        .await
        .with_context(|| format!("Failed to bind WebSocket address {}", ws_addr))?;
    let monitoring_listener = TcpListener::bind(&monitoring_addr)
        .await
        .with_context(|| format!("Failed to bind monitoring address {}", monitoring_addr))?;

    let app_state = Arc::new(AppState {
        backend,
        connections,
        monitor,
        settings,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut monitoring_shutdown = shutdown_rx.clone();
    let monitoring_handle = tokio::spawn(async move {
        info!(addr = %monitoring_addr, "Monitoring server started");
        serve_monitoring(monitoring_listener, monitoring_state, async move {
            monitoring_shutdown.changed().await.ok();
        })
        .await
    });

    let mut ws_shutdown = shutdown_rx.clone();
    let max_connections = app_state.settings.max_connections;
    let backend_name = app_state.backend.name();
    let ws_handle = tokio::spawn(async move {
        info!(
            addr = %ws_addr,
            max_connections,
            backend = backend_name,
            "TTS WebSocket server ready"
        );
        serve_websocket(ws_listener, app_state, async move {
            ws_shutdown.changed().await.ok();
        })
        .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping servers...");
    let _ = shutdown_tx.send(true);

    tokio::select! {
        _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            warn!("Shutdown timeout, forcing exit");
        }
        results = async { (ws_handle.await, monitoring_handle.await) } => {
            for result in [results.0, results.1] {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Server exited with error"),
                    Err(e) => warn!(error = %e, "Server task panicked"),
                }
            }
            info!("Servers stopped gracefully");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
