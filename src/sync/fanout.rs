// # Cross-Process Fan-Out
//
// One background task per process bridges the coordination service's
// pub/sub into the local notification bus. Every published version, even
// one produced by this process, travels through this path, so single- and
// multi-process deployments behave identically.

use crate::coord::Coordinator;
use crate::sync::bus::NotificationBus;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Spawn the fan-out task. It resubscribes with exponential backoff if the
/// upstream subscription fails or ends; delivery remains lossy by contract.
pub fn spawn(coordinator: Arc<dyn Coordinator>, bus: Arc<NotificationBus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match coordinator.subscribe().await {
                Ok(mut events) => {
                    tracing::info!("sync fan-out subscribed");
                    backoff = INITIAL_BACKOFF;
                    while let Some(event) = events.next().await {
                        tracing::trace!(
                            tenant_id = %event.tenant_id,
                            version = event.version,
                            "fan-out delivering version"
                        );
                        bus.dispatch(&event.tenant_id, event.version);
                    }
                    tracing::warn!("sync fan-out subscription ended, reconnecting");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sync fan-out subscribe failed, retrying");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    })
}
