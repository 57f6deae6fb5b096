use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    clients::rbmq::EnvelopeSender,
    error::Result,
    models::{
        envelope::Envelope,
        notification::{CreateNotification, Notification, NotificationId},
        status::NotificationStatus,
    },
    repository::NotificationStore,
};

pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    sender: Arc<dyn EnvelopeSender>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationStore>, sender: Arc<dyn EnvelopeSender>) -> Self {
        Self {
            notifications,
            sender,
        }
    }

    /// Stores a `Pending` record and publishes its first envelope.
    ///
    /// A failed publish leaves the record `Pending` and returns the broker
    /// error; the caller may resend it later.
    pub async fn create_notification(&self, request: CreateNotification) -> Result<NotificationId> {
        let notification = Notification::pending(request);
        self.notifications.create_notification(&notification).await?;

        if let Err(e) = self.sender.send(&Envelope::new(&notification)).await {
            warn!(
                notification_id = %notification.id,
                error = %e,
                "Notification stored but not published"
            );
            return Err(e);
        }

        info!(
            notification_id = %notification.id,
            dest_account = %notification.dest_account,
            event_type = %notification.event_type,
            "Notification queued"
        );
        Ok(notification.id)
    }

    pub async fn get_notification(&self, id: NotificationId) -> Result<Notification> {
        self.notifications.get_notification(id).await
    }

    pub async fn update_status(&self, id: NotificationId, status: NotificationStatus) -> Result<()> {
        self.notifications.update_status(id, status).await
    }

    /// Publishes a fresh envelope for a settled notification. Returns `false`
    /// for a `Pending` one, which is still in flight.
    pub async fn resend_notification(&self, id: NotificationId) -> Result<bool> {
        let notification = self.notifications.get_notification(id).await?;

        if notification.status == NotificationStatus::Pending {
            info!(notification_id = %id, "Notification still pending, not resending");
            return Ok(false);
        }

        self.sender.send(&Envelope::new(&notification)).await?;

        info!(
            notification_id = %id,
            previous_status = %notification.status,
            "Notification resent"
        );
        Ok(true)
    }
}
