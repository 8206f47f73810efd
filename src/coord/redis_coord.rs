// # Redis Coordinator
//
// Production coordinator: `HINCRBY tenant:{id}:version v 1` for version
// allocation, `PUBLISH sync:{id} <version>` for announcements, and a
// `PSUBSCRIBE sync:*` connection feeding the fan-out task.

use super::{counter_key, parse_topic, topic, Coordinator, EventStream, SyncEvent, COUNTER_FIELD, TOPIC_PATTERN};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub struct RedisCoordinator {
    client: redis::Client,

    /// Managed command connection; `None` once the coordinator is closed.
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisCoordinator {
    /// Connect to the coordination service. The managed connection retries
    /// transparently; pub/sub connections are opened per subscription.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| SyncError::Config(format!("invalid REDIS_ADDR: {e}")))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            client,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn manager(&self) -> Result<ConnectionManager> {
        self.conn.lock().clone().ok_or_else(|| {
            SyncError::Oracle("coordination service connection is closed".to_string())
        })
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn next_version(&self, tenant_id: &str) -> Result<u64> {
        let mut conn = self.manager()?;
        let version: i64 = conn.hincr(counter_key(tenant_id), COUNTER_FIELD, 1).await?;
        if version <= 0 {
            return Err(SyncError::Oracle(format!(
                "counter for tenant {tenant_id} returned non-positive value {version}"
            )));
        }
        Ok(version as u64)
    }

    async fn publish(&self, tenant_id: &str, version: u64) -> Result<()> {
        let mut conn = self.manager()?;
        let _: () = conn.publish(topic(tenant_id), version.to_string()).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.psubscribe(TOPIC_PATTERN).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let tenant_id = parse_topic(msg.get_channel_name())?.to_string();
            let payload: String = msg.get_payload().ok()?;
            let version = match payload.trim().parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(tenant_id = %tenant_id, payload = %payload, "discarding unparseable sync message");
                    return None;
                }
            };
            Some(SyncEvent { tenant_id, version })
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        if self.conn.lock().take().is_some() {
            tracing::info!("coordination service connection closed");
        }
    }
}
