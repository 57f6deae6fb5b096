use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
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

const MIGRATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id VARCHAR PRIMARY KEY,
        callback_key VARCHAR NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS callbacks (
        id UUID PRIMARY KEY,
        account_id VARCHAR NOT NULL REFERENCES accounts (id),
        event_type VARCHAR NOT NULL,
        url VARCHAR NOT NULL,
        updated_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (account_id, event_type)
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        source_account VARCHAR NOT NULL REFERENCES accounts (id),
        dest_account VARCHAR NOT NULL REFERENCES accounts (id),
        event_type VARCHAR NOT NULL,
        status VARCHAR NOT NULL,
        payload JSONB NOT NULL,
        updated_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS idempotency_keys (
        key VARCHAR PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
"#;

/// Postgres-backed implementation of every storage contract.
#[derive(Clone)]
pub struct DatabaseClient {
    client: Arc<Client>,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| Error::storage(format!("Failed to connect to database: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        self.client
            .batch_execute(MIGRATIONS)
            .await
            .map_err(|e| Error::storage(format!("Migration failed: {}", e)))?;

        info!("Database schema is up to date");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| Error::storage(format!("Database health check failed: {}", e)))?;

        Ok(())
    }
}

fn notification_from_row(row: &Row) -> Result<Notification> {
    let status: String = row.get("status");
    let payload = match row.get::<_, Value>("payload") {
        Value::Object(map) => map,
        other => {
            return Err(Error::storage(format!(
                "notification payload is not an object: {}",
                other
            )));
        }
    };

    Ok(Notification {
        id: NotificationId(row.get("id")),
        source_account: row.get("source_account"),
        dest_account: row.get("dest_account"),
        event_type: row.get("event_type"),
        status: status.parse()?,
        payload,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl IdempotencyStore for DatabaseClient {
    async fn save_key(&self, key: &str) -> Result<IdempotencyStatus> {
        let inserted = self
            .client
            .execute(
                "INSERT INTO idempotency_keys (key) VALUES ($1) ON CONFLICT (key) DO NOTHING",
                &[&key],
            )
            .await
            .map_err(|e| Error::storage(format!("save idempotency key: {}", e)))?;

        debug!(idempotency_key = key, inserted, "Idempotency key recorded");

        Ok(if inserted == 1 {
            IdempotencyStatus::New
        } else {
            IdempotencyStatus::Duplicate
        })
    }

    async fn find_key(&self, key: &str) -> Result<IdempotencyRecord> {
        let row = self
            .client
            .query_opt(
                "SELECT key, created_at FROM idempotency_keys WHERE key = $1",
                &[&key],
            )
            .await
            .map_err(|e| Error::storage(format!("find idempotency key: {}", e)))?
            .ok_or(Error::NotFound("idempotency key"))?;

        Ok(IdempotencyRecord {
            key: row.get("key"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        let payload = Value::Object(notification.payload.clone());

        self.client
            .execute(
                r#"
                INSERT INTO notifications (
                    id,
                    source_account,
                    dest_account,
                    event_type,
                    status,
                    payload,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &notification.id.0,
                    &notification.source_account,
                    &notification.dest_account,
                    &notification.event_type,
                    &notification.status.as_str(),
                    &payload,
                    &notification.created_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    notification_id = %notification.id,
                    "Failed to insert notification"
                );
                Error::storage(format!("create notification: {}", e))
            })?;

        Ok(())
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Notification> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT id, source_account, dest_account, event_type, status, payload, created_at
                FROM notifications
                WHERE id = $1
                "#,
                &[&id.0],
            )
            .await
            .map_err(|e| Error::storage(format!("get notification: {}", e)))?
            .ok_or(Error::NotFound("notification"))?;

        notification_from_row(&row)
    }

    async fn update_status(&self, id: NotificationId, status: NotificationStatus) -> Result<()> {
        // updated_at only moves when the status actually changes.
        let updated = self
            .client
            .execute(
                r#"
                UPDATE notifications
                SET status = $1,
                    updated_at = CASE WHEN status = $1 THEN updated_at ELSE NOW() END
                WHERE id = $2
                "#,
                &[&status.as_str(), &id.0],
            )
            .await
            .map_err(|e| Error::storage(format!("update notification status: {}", e)))?;

        if updated == 0 {
            return Err(Error::NotFound("notification"));
        }

        debug!(notification_id = %id, status = %status, "Notification status updated");
        Ok(())
    }
}

#[async_trait]
impl CallbackStore for DatabaseClient {
    async fn create_callback(&self, callback: &Callback) -> Result<()> {
        let inserted = self
            .client
            .execute(
                r#"
                INSERT INTO callbacks (id, account_id, event_type, url)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (account_id, event_type) DO NOTHING
                "#,
                &[
                    &callback.id,
                    &callback.account_id,
                    &callback.event_type,
                    &callback.url,
                ],
            )
            .await
            .map_err(|e| Error::storage(format!("create callback: {}", e)))?;

        if inserted == 0 {
            return Err(Error::AlreadyExists("callback"));
        }

        Ok(())
    }

    async fn get_callback(&self, id: Uuid) -> Result<Callback> {
        let row = self
            .client
            .query_opt(
                "SELECT id, account_id, event_type, url FROM callbacks WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| Error::storage(format!("get callback: {}", e)))?
            .ok_or(Error::NotFound("callback"))?;

        Ok(Callback {
            id: row.get("id"),
            account_id: row.get("account_id"),
            event_type: row.get("event_type"),
            url: row.get("url"),
        })
    }
}

#[async_trait]
impl AccountStore for DatabaseClient {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let inserted = self
            .client
            .execute(
                r#"
                INSERT INTO accounts (id, callback_key, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
                &[&account.id, &account.callback_key, &account.created_at],
            )
            .await
            .map_err(|e| Error::storage(format!("create account: {}", e)))?;

        if inserted == 0 {
            return Err(Error::AlreadyExists("account"));
        }

        Ok(())
    }

    async fn get_account(&self, id: &str) -> Result<Account> {
        let row = self
            .client
            .query_opt(
                "SELECT id, callback_key, created_at FROM accounts WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| Error::storage(format!("get account: {}", e)))?
            .ok_or(Error::NotFound("account"))?;

        Ok(Account {
            id: row.get("id"),
            callback_key: row.get("callback_key"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl DestinationResolver for DatabaseClient {
    async fn lookup(&self, account: &str, event_type: &str) -> Result<Destination> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT c.url, a.callback_key
                FROM callbacks c
                JOIN accounts a ON a.id = c.account_id
                WHERE c.account_id = $1 AND c.event_type = $2
                "#,
                &[&account, &event_type],
            )
            .await
            .map_err(|e| Error::storage(format!("lookup destination: {}", e)))?
            .ok_or(Error::NotFound("callback"))?;

        Ok(Destination {
            url: row.get("url"),
            secret: row.get("callback_key"),
        })
    }
}
