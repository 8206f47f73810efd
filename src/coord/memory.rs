// # In-Process Coordinator
//
// Single-process stand-in for the Redis coordinator, used by the test suite
// and for development without a coordination service. Keeps the same
// contract: counters are atomic per tenant, and published events are only
// observable through `subscribe`; a producer never feeds local queues
// directly.

use super::{Coordinator, EventStream, SyncEvent};
use crate::error::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const EVENT_BUFFER: usize = 256;

pub struct MemoryCoordinator {
    counters: Mutex<HashMap<String, u64>>,
    events: broadcast::Sender<SyncEvent>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            counters: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Current counter value for a tenant without advancing it.
    pub fn current_version(&self, tenant_id: &str) -> u64 {
        self.counters.lock().get(tenant_id).copied().unwrap_or(0)
    }

    /// Number of live subscriptions. Lets tests wait for the fan-out task
    /// before publishing.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn next_version(&self, tenant_id: &str) -> Result<u64> {
        let mut counters = self.counters.lock();
        let slot = counters.entry(tenant_id.to_string()).or_insert(0);
        *slot += 1;
        Ok(*slot)
    }

    async fn publish(&self, tenant_id: &str, version: u64) -> Result<()> {
        // No receivers is fine: notifications are lossy by contract.
        let _ = self.events.send(SyncEvent {
            tenant_id: tenant_id.to_string(),
            version,
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream> {
        let rx = self.events.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() });
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        // Nothing to release; counters and the event channel die with us.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn versions_are_monotonic_per_tenant() {
        let coord = MemoryCoordinator::new();
        assert_eq!(coord.next_version("acme").await.unwrap(), 1);
        assert_eq!(coord.next_version("acme").await.unwrap(), 2);
        assert_eq!(coord.next_version("acme").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tenants_do_not_share_counters() {
        let coord = MemoryCoordinator::new();
        coord.next_version("acme").await.unwrap();
        coord.next_version("acme").await.unwrap();
        assert_eq!(coord.next_version("globex").await.unwrap(), 1);
        assert_eq!(coord.current_version("acme"), 2);
    }

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let coord = MemoryCoordinator::new();
        let mut stream = coord.subscribe().await.unwrap();

        coord.publish("acme", 7).await.unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.tenant_id, "acme");
        assert_eq!(event.version, 7);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let coord = MemoryCoordinator::new();
        assert!(coord.publish("acme", 1).await.is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let coord = MemoryCoordinator::new();
        coord.close().await;
        coord.close().await;
        assert_eq!(coord.next_version("acme").await.unwrap(), 1);
    }
}
