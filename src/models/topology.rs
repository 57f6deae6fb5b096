use std::time::Duration;

/// Primary exchange, queue, and routing key of the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: "notifs_exchange".to_string(),
            queue: "notifs_queue".to_string(),
            routing_key: "notifs_queue.default".to_string(),
        }
    }
}

/// A TTL-only queue that dead-letters back to the primary routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayQueue {
    pub name: String,
    pub routing_key: String,
    pub delay: Duration,
}

impl DelayQueue {
    pub fn message_ttl_ms(&self) -> i64 {
        i64::try_from(self.delay.as_millis()).unwrap_or(i64::MAX)
    }

    /// Idle queues expire after twice the message TTL.
    pub fn expires_ms(&self) -> i64 {
        self.message_ttl_ms().saturating_mul(2)
    }
}

impl Topology {
    pub fn delay_queue(&self, delay: Duration) -> DelayQueue {
        let secs = delay.as_secs();

        DelayQueue {
            name: format!("{}.retry.{}", self.queue, secs),
            routing_key: format!("{}.{}", self.queue, secs),
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_queue_is_named_after_its_delay() {
        let queue = Topology::default().delay_queue(Duration::from_secs(9));

        assert_eq!(queue.name, "notifs_queue.retry.9");
        assert_eq!(queue.routing_key, "notifs_queue.9");
        assert_eq!(queue.message_ttl_ms(), 9_000);
        assert_eq!(queue.expires_ms(), 18_000);
    }
}
