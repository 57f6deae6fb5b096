use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    error::Result,
    models::notification::{Notification, NotificationId},
};

/// Wire message describing one delivery attempt of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub notif_id: NotificationId,
    pub dest_account: String,
    pub event_type: String,
    pub payload: Map<String, Value>,

    /// Bumped on every reschedule. Never part of the idempotency key.
    #[serde(default)]
    pub retry_count: u32,
}

/// Fields that identify an envelope for deduplication.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    notif_id: &'a NotificationId,
    dest_account: &'a str,
    event_type: &'a str,
    payload: &'a Map<String, Value>,
}

impl Envelope {
    pub fn new(notification: &Notification) -> Self {
        Self {
            notif_id: notification.id,
            dest_account: notification.dest_account.clone(),
            event_type: notification.event_type.clone(),
            payload: notification.payload.clone(),
            retry_count: 0,
        }
    }

    /// Hex-encoded SHA-256 over every field except `retry_count`.
    ///
    /// Payload maps serialize with sorted keys, so equal payloads always
    /// hash to the same key regardless of insertion order.
    pub fn idempotency_key(&self) -> Result<String> {
        let material = serde_json::to_vec(&KeyMaterial {
            notif_id: &self.notif_id,
            dest_account: &self.dest_account,
            event_type: &self.event_type,
            payload: &self.payload,
        })?;

        Ok(format!("{:x}", Sha256::digest(&material)))
    }

    /// The envelope to publish for the next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn envelope() -> Envelope {
        let payload = json!({ "amount": 1250, "currency": "EUR", "lines": [1, 2] });

        Envelope {
            notif_id: NotificationId(Uuid::new_v4()),
            dest_account: "acct_x".to_string(),
            event_type: "INVOICE".to_string(),
            payload: payload.as_object().cloned().unwrap(),
            retry_count: 0,
        }
    }

    #[test]
    fn key_ignores_retry_count() {
        let first = envelope();
        let retried = first.next_attempt().next_attempt();

        assert_eq!(retried.retry_count, 2);
        assert_eq!(first.idempotency_key().unwrap(), retried.idempotency_key().unwrap());
    }

    #[test]
    fn key_changes_with_any_other_field() {
        let base = envelope();
        let key = base.idempotency_key().unwrap();

        let mut other = base.clone();
        other.dest_account = "acct_y".to_string();
        assert_ne!(other.idempotency_key().unwrap(), key);

        let mut other = base.clone();
        other.event_type = "RECEIPT".to_string();
        assert_ne!(other.idempotency_key().unwrap(), key);

        let mut other = base.clone();
        other.payload.insert("amount".to_string(), json!(1251));
        assert_ne!(other.idempotency_key().unwrap(), key);

        let mut other = base.clone();
        other.notif_id = NotificationId(Uuid::new_v4());
        assert_ne!(other.idempotency_key().unwrap(), key);
    }

    #[test]
    fn key_is_fixed_width_hex() {
        let key = envelope().idempotency_key().unwrap();

        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_retry_count_decodes_as_first_attempt() {
        let envelope: Envelope = serde_json::from_value(json!({
            "notif_id": Uuid::new_v4(),
            "dest_account": "acct_x",
            "event_type": "INVOICE",
            "payload": { "k": "v" }
        }))
        .unwrap();

        assert_eq!(envelope.retry_count, 0);
    }
}
