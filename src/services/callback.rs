use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    clients::webhook::DeliveryTransport,
    error::Result,
    models::callback::Callback,
    processor::{CALLBACK_TOKEN_HEADER, IDEMPOTENCY_KEY_HEADER},
    repository::{AccountStore, CallbackStore},
};

const TEST_IDEMPOTENCY_KEY: &str = "test-1234";

/// Destination bindings: one URL per (account, event type).
pub struct CallbackService {
    callbacks: Arc<dyn CallbackStore>,
    accounts: Arc<dyn AccountStore>,
    transport: Arc<dyn DeliveryTransport>,
}

impl CallbackService {
    pub fn new(
        callbacks: Arc<dyn CallbackStore>,
        accounts: Arc<dyn AccountStore>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        Self {
            callbacks,
            accounts,
            transport,
        }
    }

    pub async fn create_callback(
        &self,
        account_id: &str,
        event_type: &str,
        url: &str,
    ) -> Result<Callback> {
        self.accounts.get_account(account_id).await?;

        let callback = Callback::new(account_id.to_string(), event_type.to_string(), url.to_string());
        self.callbacks.create_callback(&callback).await?;

        info!(
            callback_id = %callback.id,
            account_id,
            event_type,
            "Callback registered"
        );
        Ok(callback)
    }

    pub async fn get_callback(&self, id: Uuid) -> Result<Callback> {
        self.callbacks.get_callback(id).await
    }

    /// Sends a fixed greeting to the bound URL, bypassing the queue.
    pub async fn test_callback(&self, id: Uuid) -> Result<()> {
        let callback = self.callbacks.get_callback(id).await?;
        let account = self.accounts.get_account(&callback.account_id).await?;

        let body = serde_json::to_vec(&json!({ "message": "Hello" }))?;
        let headers = [
            (IDEMPOTENCY_KEY_HEADER, TEST_IDEMPOTENCY_KEY.to_string()),
            (CALLBACK_TOKEN_HEADER, account.callback_key),
        ];

        self.transport.deliver(&callback.url, body, &headers).await?;

        info!(callback_id = %id, url = %callback.url, "Test callback delivered");
        Ok(())
    }
}
