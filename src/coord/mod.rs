// # Coordination Service
//
// The only cross-process state the engine depends on: an atomic per-tenant
// version counter and a pub/sub channel for fan-out. Both sit behind the
// `Coordinator` trait so the engine is wired identically against the Redis
// deployment and the in-process implementation the test suite uses.
//
// Every producer publishes through the coordinator and receives on its own
// subscription; there is no local shortcut past the bus.

mod memory;
mod redis_coord;

pub use memory::MemoryCoordinator;
pub use redis_coord::RedisCoordinator;

use crate::error::Result;
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

/// Channel prefix for per-tenant notification topics.
pub const TOPIC_PREFIX: &str = "sync:";

/// Pattern matching every tenant's notification topic.
pub const TOPIC_PATTERN: &str = "sync:*";

/// Hash field holding the monotonic counter value.
pub const COUNTER_FIELD: &str = "v";

/// A version announcement received from the coordination service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tenant_id: String,
    pub version: u64,
}

pub type EventStream = Pin<Box<dyn Stream<Item = SyncEvent> + Send>>;

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Atomically allocate the next version for a tenant. If this returns,
    /// the counter has been durably incremented.
    async fn next_version(&self, tenant_id: &str) -> Result<u64>;

    /// Announce a committed version on the tenant's topic. Fire-and-forget
    /// from the caller's point of view; delivery is lossy by contract.
    async fn publish(&self, tenant_id: &str, version: u64) -> Result<()>;

    /// Open a pattern subscription over every tenant's topic.
    async fn subscribe(&self) -> Result<EventStream>;

    /// Release the coordination-service connection. Idempotent; called once
    /// during graceful shutdown, after the fan-out task has stopped.
    async fn close(&self);
}

/// Notification topic for one tenant.
pub fn topic(tenant_id: &str) -> String {
    format!("{TOPIC_PREFIX}{tenant_id}")
}

/// Counter key for one tenant.
pub fn counter_key(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}:version")
}

/// Extract the tenant id from a notification topic, if it is one.
pub fn parse_topic(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(TOPIC_PREFIX)
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips() {
        let t = topic("acme");
        assert_eq!(t, "sync:acme");
        assert_eq!(parse_topic(&t), Some("acme"));
    }

    #[test]
    fn foreign_channels_are_rejected() {
        assert_eq!(parse_topic("other:acme"), None);
        assert_eq!(parse_topic("sync:"), None);
    }

    #[test]
    fn counter_key_shape() {
        assert_eq!(counter_key("acme"), "tenant:acme:version");
    }
}
