use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::{sync::Mutex, time::sleep};
use webhook_service::{
    clients::{memory::InMemoryStore, rbmq::EnvelopeSender, webhook::DeliveryTransport},
    error::{Error, Result},
    models::{
        account::Account,
        callback::Callback,
        envelope::Envelope,
        notification::{CreateNotification, Notification},
        topology::{DelayQueue, Topology},
    },
    processor::{IDEMPOTENCY_KEY_HEADER, MessageProcessor},
    repository::{AccountStore, CallbackStore, NotificationStore},
    retry::{Rescheduler, backoff_delay},
    worker::InboundDelivery,
};

pub const EVENT_TYPE: &str = "INVOICE";

pub fn invoice_payload() -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("invoice_id".to_string(), json!("inv_42"));
    payload.insert("amount".to_string(), json!(1999));
    payload
}

pub async fn seed_account(store: &InMemoryStore) -> Account {
    let account = Account::generate();
    store.create_account(&account).await.unwrap();
    account
}

pub async fn seed_binding(store: &InMemoryStore, url: &str) -> Account {
    let account = seed_account(store).await;
    let callback = Callback::new(account.id.clone(), EVENT_TYPE.to_string(), url.to_string());
    store.create_callback(&callback).await.unwrap();
    account
}

pub async fn seed_notification(store: &InMemoryStore, dest_account: &str) -> Notification {
    let notification = Notification::pending(CreateNotification {
        source_account: "acct_source".to_string(),
        dest_account: dest_account.to_string(),
        event_type: EVENT_TYPE.to_string(),
        payload: invoice_payload(),
    });
    store.create_notification(&notification).await.unwrap();
    notification
}

pub fn processor(store: &Arc<InMemoryStore>, transport: Arc<dyn DeliveryTransport>) -> Arc<MessageProcessor> {
    Arc::new(MessageProcessor::new(
        store.clone(),
        store.clone(),
        store.clone(),
        transport,
    ))
}

/// A delivery that counts its acknowledgements.
#[derive(Debug)]
pub struct FakeDelivery {
    data: Vec<u8>,
    acks: Arc<AtomicUsize>,
}

impl FakeDelivery {
    pub fn new(data: Vec<u8>, acks: &Arc<AtomicUsize>) -> Self {
        Self {
            data,
            acks: acks.clone(),
        }
    }

    pub fn envelope(envelope: &Envelope, acks: &Arc<AtomicUsize>) -> Self {
        Self::new(serde_json::to_vec(envelope).unwrap(), acks)
    }
}

#[async_trait]
impl InboundDelivery for FakeDelivery {
    fn payload(&self) -> &[u8] {
        &self.data
    }

    async fn ack(&self) -> Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records what would have been published to the delay queues.
#[derive(Default)]
pub struct RecordingRescheduler {
    pub published: Mutex<Vec<Envelope>>,
    pub fail: bool,
}

impl RecordingRescheduler {
    pub fn failing() -> Self {
        Self {
            published: Mutex::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl Rescheduler for RecordingRescheduler {
    async fn reschedule(&self, envelope: &Envelope) -> Result<DelayQueue> {
        if self.fail {
            return Err(Error::topology("channel closed"));
        }

        self.published.lock().await.push(envelope.next_attempt());
        Ok(Topology::default().delay_queue(backoff_delay(envelope.retry_count)))
    }
}

/// Succeeds after `delay`, tracking calls and the idempotency keys they carried.
pub struct SlowTransport {
    delay: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub idempotency_keys: Mutex<Vec<String>>,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            idempotency_keys: Mutex::default(),
        }
    }
}

#[async_trait]
impl DeliveryTransport for SlowTransport {
    async fn deliver(&self, _url: &str, _body: Vec<u8>, headers: &[(&str, String)]) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some((_, key)) = headers.iter().find(|(name, _)| *name == IDEMPOTENCY_KEY_HEADER) {
            self.idempotency_keys.lock().await.push(key.clone());
        }
        sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Captures sent envelopes, optionally failing every send afterwards.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Envelope>>,
    pub fail: bool,
}

#[async_trait]
impl EnvelopeSender for RecordingSender {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.sent.lock().await.push(envelope.clone());
        if self.fail {
            return Err(Error::broker("connection reset"));
        }
        Ok(())
    }
}

/// Headers of every request a wiremock server received, by name.
pub async fn received_headers(server: &wiremock::MockServer, name: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| request.headers.get(name))
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
