use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tokio::signal;
use tracing::{error, info};
use webhook_service::{
    api::run_api_server,
    clients::{
        database::DatabaseClient,
        health::HealthChecker,
        rbmq::RabbitMqClient,
        redis::RedisIdempotencyStore,
        webhook::HttpDeliveryTransport,
    },
    config::{Config, IdempotencyBackend},
    processor::MessageProcessor,
    repository::IdempotencyStore,
    retry::RetryScheduler,
    telemetry,
    worker::DispatchWorker,
};

/// Runs the dispatch worker and the health server. Producers embed the
/// library services (`NotificationService`, `AccountService`,
/// `CallbackService`) behind their own surface.
#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    telemetry::init(&config)?;

    let _ = rustls::crypto::ring::default_provider().install_default();

    let database = DatabaseClient::connect(&config.database_url).await?;
    database.migrate().await?;

    let topology = config.topology();
    let broker = Arc::new(RabbitMqClient::connect(&config.rabbitmq_url, topology.clone()).await?);

    let cache = match config.idempotency_backend {
        IdempotencyBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow!("REDIS_URL is required when IDEMPOTENCY_BACKEND=redis"))?;
            Some(RedisIdempotencyStore::connect(url, config.idempotency_ttl_seconds).await?)
        }
        IdempotencyBackend::Postgres => None,
    };

    let idempotency: Arc<dyn IdempotencyStore> = match &cache {
        Some(redis) => Arc::new(redis.clone()),
        None => Arc::new(database.clone()),
    };

    let store = Arc::new(database.clone());
    let processor = Arc::new(MessageProcessor::new(
        idempotency,
        store.clone(),
        store,
        Arc::new(HttpDeliveryTransport::new(config.delivery_timeout())?),
    ));

    let worker_channel = broker.create_channel().await?;
    let rescheduler = Arc::new(RetryScheduler::new(worker_channel.clone(), topology.clone()));
    let worker = DispatchWorker::new(processor, rescheduler, config.worker_config());
    let mut stop = worker.stop_handle();

    let prefetch_count = config.prefetch_count;
    let mut worker_task = tokio::spawn(async move {
        worker
            .start(&worker_channel, &topology, prefetch_count)
            .await
    });

    let health_checker = HealthChecker::new(database, broker.clone(), cache);
    let api_task = tokio::spawn(run_api_server(config.server_port, health_checker));

    info!("Webhook service started");

    let exited = tokio::select! {
        result = signal::ctrl_c() => {
            result.map_err(|e| anyhow!("Failed to listen for shutdown signal: {}", e))?;
            None
        }
        joined = &mut worker_task => Some(joined),
    };

    let joined = match exited {
        Some(joined) => joined,
        None => {
            info!("Shutdown signal received, draining worker");
            stop.stop().await;
            worker_task.await
        }
    };

    api_task.abort();

    match joined {
        Ok(Ok(())) => {
            info!("Webhook service stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Dispatch worker failed");
            Err(anyhow!("Dispatch worker failed: {}", e))
        }
        Err(e) => {
            error!(error = %e, "Dispatch worker task panicked");
            Err(anyhow!("Dispatch worker task panicked: {}", e))
        }
    }
}
