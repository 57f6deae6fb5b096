use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Destination binding: where events of one type for one account are POSTed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    pub id: Uuid,
    pub account_id: String,
    pub event_type: String,
    pub url: String,
}

impl Callback {
    pub fn new(account_id: String, event_type: String, url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            event_type,
            url,
        }
    }
}

/// Resolved delivery target for an (account, event type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub secret: String,
}
