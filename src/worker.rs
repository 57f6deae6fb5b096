//! The consumption loop.
//!
//! Each delivery is processed on its own task, gated by a semaphore sized by
//! `WORKER_CONCURRENCY`. A failed attempt is rescheduled through the delay
//! queues and the original delivery is acknowledged either way.

use std::{fmt::Display, pin::pin, sync::Arc};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::Channel;
use tokio::{
    select,
    sync::{Semaphore, watch},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::rbmq::create_consumer,
    error::{Error, Result},
    models::{envelope::Envelope, topology::Topology},
    processor::MessageProcessor,
    retry::Rescheduler,
};

/// A manually acknowledged message taken off the primary queue.
#[async_trait]
pub trait InboundDelivery: Send + Sync + 'static {
    fn payload(&self) -> &[u8];

    async fn ack(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// `None` keeps rescheduling forever.
    pub max_retry_attempts: Option<u32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            max_retry_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

pub struct DispatchWorker {
    processor: Arc<MessageProcessor>,
    rescheduler: Arc<dyn Rescheduler>,
    config: WorkerConfig,
    shutdown: CancellationToken,
    state: watch::Sender<WorkerState>,
}

impl DispatchWorker {
    pub fn new(
        processor: Arc<MessageProcessor>,
        rescheduler: Arc<dyn Rescheduler>,
        config: WorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Initializing);

        Self {
            processor,
            rescheduler,
            config,
            shutdown: CancellationToken::new(),
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: self.shutdown.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Declares the primary topology, starts consuming, and runs until stopped.
    /// Losing the consumer stream drains in-flight work and returns an error.
    /// A declaration failure is returned before the worker leaves Initializing.
    pub async fn start(&self, channel: &Channel, topology: &Topology, prefetch_count: u16) -> Result<()> {
        let consumer = create_consumer(channel, topology, prefetch_count).await?;
        self.run(consumer).await
    }

    pub async fn run<S, D, E>(&self, deliveries: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<D, E>>,
        D: InboundDelivery,
        E: Display,
    {
        let mut deliveries = pin!(deliveries);
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();
        let mut closed_early = false;

        self.state.send_replace(WorkerState::Running);
        info!(
            concurrency = self.config.concurrency,
            max_retry_attempts = ?self.config.max_retry_attempts,
            "Dispatch worker running"
        );

        loop {
            let permit = select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let processor = self.processor.clone();
                    let rescheduler = self.rescheduler.clone();
                    let config = self.config;

                    in_flight.spawn(async move {
                        handle_delivery(&processor, rescheduler.as_ref(), config, &delivery).await;
                        drop(permit);
                    });
                }
                Some(Err(e)) => {
                    error!(error = %e, "Failed to receive delivery");
                }
                None => {
                    warn!("Delivery stream closed without a stop request");
                    closed_early = true;
                    break;
                }
            }

            // Reap finished tasks so the set does not grow with total throughput.
            while in_flight.try_join_next().is_some() {}
        }

        self.state.send_replace(WorkerState::Draining);
        info!(in_flight = in_flight.len(), "Dispatch worker draining");

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Processing task panicked");
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        info!("Dispatch worker stopped");

        if closed_early {
            return Err(Error::broker("delivery stream closed"));
        }
        Ok(())
    }
}

async fn handle_delivery(
    processor: &MessageProcessor,
    rescheduler: &dyn Rescheduler,
    config: WorkerConfig,
    delivery: &impl InboundDelivery,
) {
    match serde_json::from_slice::<Envelope>(delivery.payload()) {
        Ok(envelope) => {
            if let Err(e) = processor.process(&envelope).await {
                retry_or_give_up(rescheduler, config, &envelope, &e).await;
            }
        }
        Err(e) => {
            // Redelivery cannot fix a malformed body.
            error!(error = %Error::from(e), "Dropping undecodable envelope");
        }
    }

    if let Err(e) = delivery.ack().await {
        error!(error = %e, "Failed to acknowledge delivery");
    }
}

async fn retry_or_give_up(
    rescheduler: &dyn Rescheduler,
    config: WorkerConfig,
    envelope: &Envelope,
    failure: &Error,
) {
    if let Some(max) = config.max_retry_attempts {
        if envelope.retry_count >= max {
            warn!(
                notification_id = %envelope.notif_id,
                retry_count = envelope.retry_count,
                max_retry_attempts = max,
                error = %failure.primary(),
                "Retry limit reached, giving up on notification"
            );
            return;
        }
    }

    match rescheduler.reschedule(envelope).await {
        Ok(queue) => debug!(
            notification_id = %envelope.notif_id,
            queue = %queue.name,
            "Retry scheduled"
        ),
        Err(e) => error!(
            notification_id = %envelope.notif_id,
            retry_count = envelope.retry_count,
            error = %e,
            "Failed to reschedule envelope, attempt is lost"
        ),
    }
}

/// Requests a drain and waits for it. Safe to call any number of times.
///
/// Returns at once while the worker is still `Initializing`: nothing is in
/// flight yet, and a later `run` exits on the cancelled token.
#[derive(Clone)]
pub struct StopHandle {
    shutdown: CancellationToken,
    state: watch::Receiver<WorkerState>,
}

impl StopHandle {
    pub async fn stop(&mut self) {
        self.shutdown.cancel();

        // Err means the worker was dropped, which is as stopped as it gets.
        let _ = self
            .state
            .wait_for(|state| matches!(state, WorkerState::Initializing | WorkerState::Stopped))
            .await;
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
