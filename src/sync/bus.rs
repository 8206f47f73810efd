// # Notification Bus
//
// In-process fan-out of version numbers to stream subscribers. Each
// subscriber owns a bounded queue; a full queue drops the newest version
// instead of blocking the producer, because a missed notification costs the
// client at most one extra delta pull. Producers never call `dispatch`
// directly; versions arrive here only through the coordination service's
// pub/sub (see `fanout`).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Depth of each subscriber's version queue.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

pub struct NotificationBus {
    subscribers: RwLock<HashMap<String, Vec<SubscriberSlot>>>,
    next_id: AtomicU64,
}

struct SubscriberSlot {
    id: u64,
    tx: mpsc::Sender<u64>,
}

/// A live subscription for one tenant. Dropping it unsubscribes, which makes
/// cleanup from a stream endpoint's termination path automatic.
pub struct Subscription {
    tenant_id: String,
    id: u64,
    rx: mpsc::Receiver<u64>,
    bus: Arc<NotificationBus>,
}

impl Subscription {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Next version number, or `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<u64> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `None` when the queue is currently empty.
    pub fn try_recv(&mut self) -> Option<u64> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.tenant_id, self.id);
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for a tenant's version announcements.
    pub fn subscribe(self: &Arc<Self>, tenant_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .push(SubscriberSlot { id, tx });

        tracing::debug!(tenant_id = %tenant_id, subscriber = id, "stream subscribed");

        Subscription {
            tenant_id: tenant_id.to_string(),
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Deliver a version to every local subscriber of the tenant. Overflowed
    /// queues drop the version silently; the client recovers via `since`.
    pub fn dispatch(&self, tenant_id: &str, version: u64) {
        let subscribers = self.subscribers.read();
        let Some(slots) = subscribers.get(tenant_id) else {
            return;
        };
        for slot in slots {
            if slot.tx.try_send(version).is_err() {
                tracing::trace!(
                    tenant_id = %tenant_id,
                    subscriber = slot.id,
                    version,
                    "subscriber queue full, dropping version"
                );
            }
        }
    }

    /// Number of live subscribers for a tenant.
    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.subscribers
            .read()
            .get(tenant_id)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }

    fn unsubscribe(&self, tenant_id: &str, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(slots) = subscribers.get_mut(tenant_id) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                subscribers.remove(tenant_id);
            }
        }
        tracing::debug!(tenant_id = %tenant_id, subscriber = id, "stream unsubscribed");
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_reaches_tenant_subscribers_only() {
        let bus = Arc::new(NotificationBus::new());
        let mut acme = bus.subscribe("acme");
        let mut globex = bus.subscribe("globex");

        bus.dispatch("acme", 1);

        assert_eq!(acme.recv().await, Some(1));
        assert!(globex.try_recv().is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_newest_versions() {
        let bus = Arc::new(NotificationBus::new());
        let mut sub = bus.subscribe("acme");

        for v in 1..=(SUBSCRIBER_QUEUE_DEPTH as u64 + 5) {
            bus.dispatch("acme", v);
        }

        let mut received = Vec::new();
        while let Some(v) = sub.try_recv() {
            received.push(v);
        }
        assert_eq!(received.len(), SUBSCRIBER_QUEUE_DEPTH);
        // The oldest queued versions survive, in order.
        assert_eq!(received[0], 1);
        assert_eq!(*received.last().unwrap(), SUBSCRIBER_QUEUE_DEPTH as u64);
    }

    #[tokio::test]
    async fn drop_unsubscribes_and_clears_tenant_entry() {
        let bus = Arc::new(NotificationBus::new());
        let sub = bus.subscribe("acme");
        assert_eq!(bus.subscriber_count("acme"), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count("acme"), 0);
        assert!(bus.subscribers.read().get("acme").is_none());
    }

    #[tokio::test]
    async fn dispatch_to_unknown_tenant_is_a_no_op() {
        let bus = Arc::new(NotificationBus::new());
        bus.dispatch("nobody", 42);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_version() {
        let bus = Arc::new(NotificationBus::new());
        let mut first = bus.subscribe("acme");
        let mut second = bus.subscribe("acme");

        bus.dispatch("acme", 2);
        bus.dispatch("acme", 3);

        assert_eq!(first.recv().await, Some(2));
        assert_eq!(first.recv().await, Some(3));
        assert_eq!(second.recv().await, Some(2));
        assert_eq!(second.recv().await, Some(3));
    }
}
