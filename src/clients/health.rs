use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{database::DatabaseClient, rbmq::RabbitMqClient, redis::RedisIdempotencyStore},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth, overall_status},
};

const CRITICAL_CHECKS: &[&str] = &["database", "message_broker"];

/// Probes the shared connections the service already holds.
pub struct HealthChecker {
    database: DatabaseClient,
    broker: Arc<RabbitMqClient>,
    cache: Option<RedisIdempotencyStore>,
}

impl HealthChecker {
    pub fn new(
        database: DatabaseClient,
        broker: Arc<RabbitMqClient>,
        cache: Option<RedisIdempotencyStore>,
    ) -> Self {
        Self {
            database,
            broker,
            cache,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq());

        if let Some(cache) = &self.cache {
            checks.insert("cache_service".to_string(), check_redis(cache).await);
        }

        HealthCheckResponse {
            status: overall_status(&checks, CRITICAL_CHECKS),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.broker.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ connection is not open");
            ServiceHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: None,
                error: Some("Connection is not open".to_string()),
            }
        }
    }
}

async fn check_redis(cache: &RedisIdempotencyStore) -> ServiceHealth {
    let start = Instant::now();

    match cache.health_check().await {
        Ok(()) => {
            let elapsed = start.elapsed().as_millis() as u64;
            debug!(response_time_ms = elapsed, "Redis health check passed");
            ServiceHealth::healthy(elapsed)
        }
        Err(e) => {
            warn!(error = %e, "Redis ping failed");
            ServiceHealth::unhealthy(format!("Ping failed: {}", e))
        }
    }
}
