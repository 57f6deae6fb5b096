use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    models::status::IdempotencyStatus,
    repository::{IdempotencyRecord, IdempotencyStore},
};

/// Idempotency keys kept in Redis with `SET NX`.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    connection: MultiplexedConnection,
    ttl_seconds: u64,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(redis_url)
            .map_err(|e| Error::storage(format!("Failed to create redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::storage(format!("Failed to connect to redis: {}", e)))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            ttl_seconds,
        })
    }

    fn cache_key(idempotency_key: &str) -> String {
        format!("idempotency:{}", idempotency_key)
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.ping::<String>()
            .await
            .map_err(|e| Error::storage(format!("Redis ping failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn save_key(&self, key: &str) -> Result<IdempotencyStatus> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::cache_key(key))
            .arg(Utc::now().timestamp_millis())
            .arg("NX");
        if self.ttl_seconds > 0 {
            cmd.arg("EX").arg(self.ttl_seconds);
        }

        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::storage(format!("save idempotency key: {}", e)))?;

        debug!(idempotency_key = key, inserted = reply.is_some(), "Idempotency key recorded");

        Ok(match reply {
            Some(_) => IdempotencyStatus::New,
            None => IdempotencyStatus::Duplicate,
        })
    }

    async fn find_key(&self, key: &str) -> Result<IdempotencyRecord> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn
            .get(Self::cache_key(key))
            .await
            .map_err(|e| Error::storage(format!("find idempotency key: {}", e)))?;

        let millis = value.ok_or(Error::NotFound("idempotency key"))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| Error::storage(format!("invalid timestamp for key '{}'", key)))?;

        Ok(IdempotencyRecord {
            key: key.to_string(),
            created_at,
        })
    }
}
