use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Performs one outbound POST per call. Never retries.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, url: &str, body: Vec<u8>, headers: &[(&str, String)]) -> Result<()>;
}

pub struct HttpDeliveryTransport {
    http_client: Client,
}

impl HttpDeliveryTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::delivery(format!("Failed to create HTTP client: {}", e)))?;

        info!(timeout_secs = timeout.as_secs(), "Webhook delivery client initialized");

        Ok(Self { http_client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpDeliveryTransport {
    async fn deliver(&self, url: &str, body: Vec<u8>, headers: &[(&str, String)]) -> Result<()> {
        let mut request = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::delivery(format!("request to {} timed out", url))
            } else {
                Error::delivery(format!("send request to {}: {}", url, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "Webhook delivered");
            Ok(())
        } else {
            Err(Error::delivery(format!(
                "expected 2xx from {} but got {}",
                url, status
            )))
        }
    }
}
