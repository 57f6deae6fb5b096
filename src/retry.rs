//! Backoff through broker topology.
//!
//! A failed envelope is parked in a TTL-only delay queue. When the TTL
//! elapses the broker dead-letters it back to the primary routing key, so
//! no timer or scheduler runs inside the service.

use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    Channel,
    options::{QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    clients::rbmq::publish_envelope,
    error::{Error, Result},
    models::{
        envelope::Envelope,
        topology::{DelayQueue, Topology},
    },
};

/// `(retry_count + 1)^2` seconds: 1s, 4s, 9s, 16s, ...
pub fn backoff_delay(retry_count: u32) -> Duration {
    let base = u64::from(retry_count).saturating_add(1);
    Duration::from_secs(base.saturating_mul(base))
}

/// Declaration arguments of a delay queue.
pub fn delay_queue_arguments(topology: &Topology, queue: &DelayQueue) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(topology.exchange.as_str().into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(topology.routing_key.as_str().into()),
    );
    arguments.insert(
        "x-message-ttl".into(),
        AMQPValue::LongLongInt(queue.message_ttl_ms()),
    );
    arguments.insert("x-expires".into(), AMQPValue::LongLongInt(queue.expires_ms()));
    arguments
}

#[async_trait]
pub trait Rescheduler: Send + Sync {
    /// Re-publishes `envelope` with `retry_count + 1` through its delay queue.
    async fn reschedule(&self, envelope: &Envelope) -> Result<DelayQueue>;
}

/// Delay-queue rescheduling on the worker's channel.
pub struct RetryScheduler {
    channel: Channel,
    topology: Topology,
}

impl RetryScheduler {
    pub fn new(channel: Channel, topology: Topology) -> Self {
        Self { channel, topology }
    }

    /// Redeclaring with identical arguments is a no-op on the broker.
    async fn declare_delay_queue(&self, queue: &DelayQueue) -> Result<()> {
        self.channel
            .queue_declare(
                queue.name.as_str(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                delay_queue_arguments(&self.topology, queue),
            )
            .await
            .map_err(|e| Error::topology(format!("declare delay queue {}: {}", queue.name, e)))?;

        self.channel
            .queue_bind(
                queue.name.as_str(),
                self.topology.exchange.as_str(),
                queue.routing_key.as_str(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::topology(format!("bind delay queue {}: {}", queue.name, e)))?;

        debug!(
            queue = %queue.name,
            routing_key = %queue.routing_key,
            ttl_ms = queue.message_ttl_ms(),
            "Delay queue declared"
        );
        Ok(())
    }
}

#[async_trait]
impl Rescheduler for RetryScheduler {
    async fn reschedule(&self, envelope: &Envelope) -> Result<DelayQueue> {
        let queue = self.topology.delay_queue(backoff_delay(envelope.retry_count));
        self.declare_delay_queue(&queue).await?;

        let next = envelope.next_attempt();
        publish_envelope(
            &self.channel,
            &self.topology.exchange,
            &queue.routing_key,
            &next,
        )
        .await
        .map_err(|e| Error::topology(e.to_string()))?;

        info!(
            notification_id = %next.notif_id,
            retry_count = next.retry_count,
            delay_secs = queue.delay.as_secs(),
            queue = %queue.name,
            "Envelope rescheduled"
        );
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use lapin::types::ShortString;

    use super::*;

    #[test]
    fn backoff_is_quadratic_in_retry_count() {
        let delays: Vec<u64> = (0..4).map(|n| backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 4, 9, 16]);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay(u32::MAX).as_secs(), u64::MAX);
    }

    #[test]
    fn delay_queue_dead_letters_to_the_primary_routing_key() {
        let topology = Topology::default();
        let queue = topology.delay_queue(backoff_delay(0));
        let arguments = delay_queue_arguments(&topology, &queue);
        let get = |key: &str| arguments.inner().get(&ShortString::from(key));

        assert_eq!(
            get("x-dead-letter-exchange"),
            Some(&AMQPValue::LongString("notifs_exchange".into()))
        );
        assert_eq!(
            get("x-dead-letter-routing-key"),
            Some(&AMQPValue::LongString("notifs_queue.default".into()))
        );
        assert_eq!(get("x-message-ttl"), Some(&AMQPValue::LongLongInt(1_000)));
        assert_eq!(get("x-expires"), Some(&AMQPValue::LongLongInt(2_000)));
    }
}
