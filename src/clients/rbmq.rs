use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    models::{envelope::Envelope, topology::Topology},
    worker::InboundDelivery,
};

/// Owns the broker connection. Channels are handed out per component.
pub struct RabbitMqClient {
    connection: Connection,
    topology: Topology,
}

impl RabbitMqClient {
    pub async fn connect(rabbitmq_url: &str, topology: Topology) -> Result<Self> {
        info!("Connecting to RabbitMQ...");

        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| Error::broker(format!("Failed to connect to RabbitMQ: {}", e)))?;

        info!("RabbitMQ connection established");

        Ok(Self {
            connection,
            topology,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn create_channel(&self) -> Result<Channel> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| Error::broker(format!("RabbitMQ channel creation failed: {}", e)))?;

        debug!(channel_id = channel.id(), "RabbitMQ channel created");
        Ok(channel)
    }
}

pub async fn declare_exchange(channel: &Channel, topology: &Topology) -> Result<()> {
    channel
        .exchange_declare(
            topology.exchange.as_str(),
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::broker(format!("Failed to declare exchange: {}", e)))?;

    debug!(exchange = %topology.exchange, "Exchange declared");
    Ok(())
}

/// Declares the primary exchange, queue, and binding.
pub async fn declare_primary(channel: &Channel, topology: &Topology) -> Result<()> {
    declare_exchange(channel, topology).await?;

    channel
        .queue_declare(
            topology.queue.as_str(),
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::broker(format!("Failed to declare queue: {}", e)))?;

    channel
        .queue_bind(
            topology.queue.as_str(),
            topology.exchange.as_str(),
            topology.routing_key.as_str(),
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::broker(format!("Failed to bind queue: {}", e)))?;

    info!(
        exchange = %topology.exchange,
        queue = %topology.queue,
        routing_key = %topology.routing_key,
        "Primary topology declared"
    );
    Ok(())
}

/// Declares the primary topology and starts a manual-ack consumer on it.
pub async fn create_consumer(
    channel: &Channel,
    topology: &Topology,
    prefetch_count: u16,
) -> Result<Consumer> {
    declare_primary(channel, topology).await?;

    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .map_err(|e| Error::broker(format!("Failed to set up QoS: {}", e)))?;

    let consumer = channel
        .basic_consume(
            topology.queue.as_str(),
            "notif_worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::broker(format!("Failed to create consumer: {}", e)))?;

    info!(queue = %topology.queue, prefetch_count, "Consumer created for queue");
    Ok(consumer)
}

/// Publishes an envelope as a persistent JSON message.
pub async fn publish_envelope(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    envelope: &Envelope,
) -> Result<()> {
    let payload = serde_json::to_vec(envelope)?;

    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_content_type("application/json".into()),
        )
        .await
        .map_err(|e| Error::broker(format!("Failed to publish message: {}", e)))?;

    Ok(())
}

#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// Publishes new envelopes onto the primary routing key.
pub struct DispatchSender {
    channel: Channel,
    topology: Topology,
}

impl DispatchSender {
    pub async fn new(channel: Channel, topology: Topology) -> Result<Self> {
        declare_exchange(&channel, &topology).await?;

        Ok(Self { channel, topology })
    }
}

#[async_trait]
impl EnvelopeSender for DispatchSender {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        publish_envelope(
            &self.channel,
            &self.topology.exchange,
            &self.topology.routing_key,
            envelope,
        )
        .await?;

        debug!(
            notification_id = %envelope.notif_id,
            routing_key = %self.topology.routing_key,
            "Envelope published"
        );
        Ok(())
    }
}

#[async_trait]
impl InboundDelivery for Delivery {
    fn payload(&self) -> &[u8] {
        &self.data
    }

    async fn ack(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::broker(format!("Failed to acknowledge message: {}", e)))
    }
}
