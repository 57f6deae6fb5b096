use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    models::{
        account::Account,
        callback::{Callback, Destination},
        notification::{Notification, NotificationId},
        status::{IdempotencyStatus, NotificationStatus},
    },
    repository::{
        AccountStore, CallbackStore, DestinationResolver, IdempotencyRecord, IdempotencyStore,
        NotificationStore,
    },
};

/// In-memory storage for embedded deployments and tests.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
    callbacks: Mutex<HashMap<Uuid, Callback>>,
    notifications: Mutex<HashMap<NotificationId, Notification>>,
    idempotency_keys: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn idempotency_key_count(&self) -> usize {
        self.idempotency_keys.lock().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn save_key(&self, key: &str) -> Result<IdempotencyStatus> {
        let mut keys = self.idempotency_keys.lock().await;
        if keys.contains_key(key) {
            return Ok(IdempotencyStatus::Duplicate);
        }

        keys.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(IdempotencyStatus::New)
    }

    async fn find_key(&self, key: &str) -> Result<IdempotencyRecord> {
        self.idempotency_keys
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or(Error::NotFound("idempotency key"))
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.lock().await;
        if notifications.contains_key(&notification.id) {
            return Err(Error::AlreadyExists("notification"));
        }

        notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Notification> {
        self.notifications
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("notification"))
    }

    async fn update_status(&self, id: NotificationId, status: NotificationStatus) -> Result<()> {
        let mut notifications = self.notifications.lock().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(Error::NotFound("notification"))?;

        notification.status = status;
        Ok(())
    }
}

#[async_trait]
impl CallbackStore for InMemoryStore {
    async fn create_callback(&self, callback: &Callback) -> Result<()> {
        let mut callbacks = self.callbacks.lock().await;
        let taken = callbacks
            .values()
            .any(|c| c.account_id == callback.account_id && c.event_type == callback.event_type);
        if taken {
            return Err(Error::AlreadyExists("callback"));
        }

        callbacks.insert(callback.id, callback.clone());
        Ok(())
    }

    async fn get_callback(&self, id: Uuid) -> Result<Callback> {
        self.callbacks
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("callback"))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.id) {
            return Err(Error::AlreadyExists("account"));
        }

        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, id: &str) -> Result<Account> {
        self.accounts
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(Error::NotFound("account"))
    }
}

#[async_trait]
impl DestinationResolver for InMemoryStore {
    async fn lookup(&self, account: &str, event_type: &str) -> Result<Destination> {
        let url = self
            .callbacks
            .lock()
            .await
            .values()
            .find(|c| c.account_id == account && c.event_type == event_type)
            .map(|c| c.url.clone())
            .ok_or(Error::NotFound("callback"))?;

        let secret = self.get_account(account).await?.callback_key;

        Ok(Destination { url, secret })
    }
}
