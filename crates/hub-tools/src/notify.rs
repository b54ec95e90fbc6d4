use async_trait::async_trait;
use hub_core::Notification;
use tokio::sync::Mutex;
use tracing::info;

/// Delivery channel for notifications. Delivery itself (mail, push) happens downstream.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn build(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Keeps every notification in memory, in dispatch order.
#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn build(&self, mut notification: Notification) -> anyhow::Result<()> {
        notification.mark_sent(notification.created_at)?;
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn build(&self, notification: Notification) -> anyhow::Result<()> {
        info!(
            id = %notification.id,
            kind = ?notification.kind,
            level = ?notification.level,
            sender = %notification.sender,
            recipient = %notification.recipient,
            attachments = notification.attachments.len(),
            "{}",
            notification.header
        );
        Ok(())
    }
}
