//! Storage contracts the dispatch pipeline depends on.
//!
//! Every operation is atomic at the storage layer. No transaction spans
//! several calls, so callers must tolerate partial failure between them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        account::Account,
        callback::{Callback, Destination},
        notification::{Notification, NotificationId},
        status::{IdempotencyStatus, NotificationStatus},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Inserts the key if absent. An existing key is not an error.
    async fn save_key(&self, key: &str) -> Result<IdempotencyStatus>;

    async fn find_key(&self, key: &str) -> Result<IdempotencyRecord>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> Result<()>;

    async fn get_notification(&self, id: NotificationId) -> Result<Notification>;

    /// Setting the current status again is a no-op.
    async fn update_status(&self, id: NotificationId, status: NotificationStatus) -> Result<()>;
}

#[async_trait]
pub trait CallbackStore: Send + Sync {
    /// Fails with `AlreadyExists` when the (account, event type) pair is taken.
    async fn create_callback(&self, callback: &Callback) -> Result<()>;

    async fn get_callback(&self, id: Uuid) -> Result<Callback>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<()>;

    async fn get_account(&self, id: &str) -> Result<Account>;
}

#[async_trait]
pub trait DestinationResolver: Send + Sync {
    async fn lookup(&self, account: &str, event_type: &str) -> Result<Destination>;
}
