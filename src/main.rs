// # DeltaSync Server
//
// Main entry point. Wires the coordinator, tenant store manager,
// notification bus, and fan-out task together, then serves the API until a
// termination signal arrives. Shutdown stops accepting connections, drains
// in-flight handlers against a bounded deadline, and closes every tenant
// store.

use deltasync::api::server::build_router;
use deltasync::api::AppState;
use deltasync::coord::RedisCoordinator;
use deltasync::sync::fanout;
use deltasync::{Config, Result, VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = Config::from_env()?;
    info!(version = VERSION, "starting deltasync server");
    info!(
        data_dir = %config.data_dir.display(),
        redis = %config.redis_url,
        port = config.port,
        "configuration loaded"
    );

    std::fs::create_dir_all(&config.data_dir)?;

    let coordinator = Arc::new(RedisCoordinator::connect(&config.redis_url).await?);
    let state = Arc::new(AppState::new(config.clone(), coordinator)?);

    // One fan-out task per process bridges the coordination service's
    // pub/sub into the local notification bus.
    let fanout_task = fanout::spawn(state.coordinator.clone(), state.bus.clone());

    let router = build_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
        Ok(Ok(Ok(()))) => info!("all connections drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server exited with error"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => {
            // Long-lived streams never end on their own; cut them loose.
            warn!("drain deadline exceeded, closing remaining connections");
            server.abort();
        }
    }

    fanout_task.abort();
    state.stores.close_all();
    state.coordinator.close().await;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
