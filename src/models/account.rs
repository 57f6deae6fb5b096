use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CALLBACK_KEY_LEN: usize = 43;

/// A registered account. The callback key authenticates deliveries to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub callback_key: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn generate() -> Self {
        let callback_key = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(CALLBACK_KEY_LEN)
            .map(char::from)
            .collect();

        Self {
            id: Uuid::new_v4().simple().to_string(),
            callback_key,
            created_at: Utc::now(),
        }
    }
}
