use anyhow::Result;
use async_trait::async_trait;
use hub_core::Notification;
use hub_tools::NotificationSink;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::debug;

/// Channel downstream mailers and push services subscribe to.
pub const NOTIFICATIONS_CHANNEL: &str = "notifications.created";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RedisBus {
    async fn build(&self, mut notification: Notification) -> Result<()> {
        notification.mark_sent(notification.created_at)?;
        self.publish_json(NOTIFICATIONS_CHANNEL, &notification).await?;
        debug!(notification = %notification.id, recipient = %notification.recipient, "notification published");
        Ok(())
    }
}
