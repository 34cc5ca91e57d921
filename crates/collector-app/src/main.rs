use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use collector_app::config::config_path_from_args;
use collector_app::http::{router, AppState};
use collector_app::sink::MetricsSink;
use collector_app::supervisor::PollerSet;
use collector_app::{systemd, CollectorConfig, DeviceRegistry};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = config_path_from_args(std::env::args().skip(1));
    let config = CollectorConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = install_metrics();
    let registry = Arc::new(
        DeviceRegistry::from_config(&config, Arc::new(MetricsSink))
            .context("device registry init failed")?,
    );
    info!(devices = registry.len(), "starting sungrow collector");

    let mut pollers = PollerSet::new(shutdown_rx.clone(), config.poller.setup_retry);
    for poller in registry.iter() {
        pollers.spawn(poller.clone(), Duration::ZERO);
    }

    let http_handle = match config.http_listen.as_deref() {
        Some(listen) => Some(
            spawn_http(
                listen,
                AppState {
                    registry: registry.clone(),
                    metrics,
                },
                shutdown_rx.clone(),
            )
            .await?,
        ),
        None => None,
    };

    systemd::notify_ready(registry.len());
    let watchdog_handle = systemd::spawn_watchdog(shutdown_rx.clone());

    let mut shutdown_signal = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("shutdown signal received");
                break;
            }
            exit = pollers.join_next() => {
                if exit.is_none() {
                    warn!("no pollers left running");
                    break;
                }
            }
        }
    }

    systemd::notify_stopping();
    let _ = shutdown_tx.send(true);
    pollers
        .drain(config.poller.request_timeout + SHUTDOWN_GRACE)
        .await;

    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "prometheus recorder install failed");
            None
        }
    }
}

async fn spawn_http(
    listen: &str,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid http listen address {listen}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind status server on {addr}"))?;
    info!(%addr, "status server listening");

    let app = router(state);
    Ok(tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        });
        if let Err(err) = serve.await {
            warn!(error = %err, "status server failed");
        }
    }))
}
