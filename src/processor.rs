use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    clients::webhook::DeliveryTransport,
    error::{Error, Result},
    models::{
        envelope::Envelope,
        status::{IdempotencyStatus, NotificationStatus},
    },
    repository::{DestinationResolver, IdempotencyStore, NotificationStore},
};

/// Header carrying the envelope's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "X-IDEMPOTENT-KEY";
/// Header carrying the destination account's callback secret.
pub const CALLBACK_TOKEN_HEADER: &str = "X-CALLBACK-TOKEN";

/// Executes one delivery attempt per call. Retrying is the caller's job.
pub struct MessageProcessor {
    idempotency: Arc<dyn IdempotencyStore>,
    destinations: Arc<dyn DestinationResolver>,
    notifications: Arc<dyn NotificationStore>,
    transport: Arc<dyn DeliveryTransport>,
}

impl MessageProcessor {
    pub fn new(
        idempotency: Arc<dyn IdempotencyStore>,
        destinations: Arc<dyn DestinationResolver>,
        notifications: Arc<dyn NotificationStore>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        Self {
            idempotency,
            destinations,
            notifications,
            transport,
        }
    }

    pub async fn process(&self, envelope: &Envelope) -> Result<()> {
        let idempotency_key = envelope.idempotency_key()?;

        info!(
            notification_id = %envelope.notif_id,
            idempotency_key = %idempotency_key,
            retry_count = envelope.retry_count,
            "Processing notification envelope"
        );

        if self.idempotency.save_key(&idempotency_key).await? == IdempotencyStatus::Duplicate {
            debug!(
                idempotency_key = %idempotency_key,
                "Key already recorded, receiver will see a duplicate"
            );
        }

        match self.deliver(envelope, &idempotency_key).await {
            Ok(()) => {
                self.notifications
                    .update_status(envelope.notif_id, NotificationStatus::Complete)
                    .await?;

                info!(
                    notification_id = %envelope.notif_id,
                    idempotency_key = %idempotency_key,
                    "Notification delivered"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    notification_id = %envelope.notif_id,
                    retry_count = envelope.retry_count,
                    error = %err,
                    "Notification delivery failed"
                );

                match self
                    .notifications
                    .update_status(envelope.notif_id, NotificationStatus::Failed)
                    .await
                {
                    Ok(()) => Err(err),
                    Err(status_err) => Err(Error::StatusUpdate {
                        source: Box::new(err),
                        status: Box::new(status_err),
                    }),
                }
            }
        }
    }

    async fn deliver(&self, envelope: &Envelope, idempotency_key: &str) -> Result<()> {
        let destination = self
            .destinations
            .lookup(&envelope.dest_account, &envelope.event_type)
            .await?;

        let body = serde_json::to_vec(&envelope.payload)?;
        let headers = [
            (IDEMPOTENCY_KEY_HEADER, idempotency_key.to_string()),
            (CALLBACK_TOKEN_HEADER, destination.secret),
        ];

        self.transport
            .deliver(&destination.url, body, &headers)
            .await
    }
}
