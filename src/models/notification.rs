use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::status::NotificationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for NotificationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub source_account: String,
    pub dest_account: String,
    pub event_type: String,
    pub status: NotificationStatus,
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Client request for a new notification.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotification {
    pub source_account: String,
    pub dest_account: String,
    pub event_type: String,
    pub payload: Map<String, Value>,
}

impl Notification {
    /// A fresh `Pending` record for the request.
    pub fn pending(request: CreateNotification) -> Self {
        Self {
            id: NotificationId::new(),
            source_account: request.source_account,
            dest_account: request.dest_account,
            event_type: request.event_type,
            status: NotificationStatus::Pending,
            payload: request.payload,
            created_at: Utc::now(),
        }
    }
}
