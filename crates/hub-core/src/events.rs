use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{Lifecycle, StateCodeError, StateGraph, TransitionError};

/// Drives how a notification is displayed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    Info,
    Action,
    Contract,
    Monetary,
}

/// Basis for the recipient's delivery preferences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationTarget {
    Contract { id: i64, uuid: Uuid },
    Invoice { id: i64, contract_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationState {
    Pending,
    Sent,
}

impl StateGraph for NotificationState {
    const ENTITY: &'static str = "notification";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Sent],
            Self::Sent => &[],
        }
    }
}

impl fmt::Display for NotificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
        })
    }
}

impl FromStr for NotificationState {
    type Err = StateCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            other => Err(StateCodeError {
                entity: Self::ENTITY,
                code: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationType,
    pub sender: Uuid,
    pub recipient: Uuid,
    pub header: String,
    pub message: String,
    pub link: String,
    pub level: NotificationLevel,
    pub target: NotificationTarget,
    pub attachments: Vec<String>,
    pub lifecycle: Lifecycle<NotificationState>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        kind: NotificationType,
        sender: Uuid,
        recipient: Uuid,
        header: impl Into<String>,
        message: impl Into<String>,
        link: impl Into<String>,
        level: NotificationLevel,
        target: NotificationTarget,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sender,
            recipient,
            header: header.into(),
            message: message.into(),
            link: link.into(),
            level,
            target,
            attachments: Vec::new(),
            lifecycle: Lifecycle::new(NotificationState::Pending, created_at),
            created_at,
        }
    }

    pub fn with_attachment(mut self, path: impl Into<String>) -> Self {
        self.attachments.push(path.into());
        self
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(NotificationState::Sent, at)
    }
}
