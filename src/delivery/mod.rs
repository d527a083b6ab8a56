//! Webhook delivery
//!
//! Serializes a batch once, signs those exact bytes when a secret is
//! configured, and posts them. A batch counts as delivered only on a 2xx
//! status; every other outcome is reported back so the caller can requeue.

mod signature;
mod transport;
mod types;

pub use signature::{
    sign, signature_header, verify_signature, SignatureError, SIGNATURE_HEADER, SIGNATURE_PREFIX,
};
pub use transport::{HttpTransport, WebhookTransport};
pub use types::{DeliveryError, WebhookPayload, WebhookRequest};

use crate::clock::Clock;
use crate::normalize::Update;
use crate::telemetry::{self, LatencyMetric};
use std::sync::Arc;
use std::time::Instant;

/// Signs and posts batches to one receiver
pub struct DeliveryEngine {
    url: String,
    secret: Option<Vec<u8>>,
    transport: Arc<dyn WebhookTransport>,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()).map(String::into_bytes),
            transport,
            clock,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_signing(&self) -> bool {
        self.secret.is_some()
    }

    /// Build the exact request for `batch`
    pub fn build_request(&self, batch: &[Update]) -> Result<WebhookRequest, DeliveryError> {
        let payload = WebhookPayload {
            ts: self.clock.unix_seconds(),
            updates: batch,
        };
        let body = serde_json::to_vec(&payload)?;

        let mut headers = vec![("content-type", "application/json".to_string())];
        if let Some(secret) = &self.secret {
            headers.push((SIGNATURE_HEADER, signature_header(secret, &body)?));
        }

        Ok(WebhookRequest { body, headers })
    }

    /// Post one batch. `Ok` carries the 2xx status.
    pub async fn deliver(&self, batch: &[Update]) -> Result<u16, DeliveryError> {
        let request = self.build_request(batch)?;
        let started = Instant::now();

        let result = match self.transport.post(&self.url, &request).await {
            Ok(status) if (200..300).contains(&status) => Ok(status),
            Ok(status) => Err(DeliveryError::Status { status }),
            Err(e) => Err(e),
        };

        telemetry::record_latency(LatencyMetric::Delivery, started.elapsed());
        match &result {
            Ok(status) => {
                tracing::info!(url = %self.url, status, count = batch.len(), "Webhook delivered");
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.url,
                    status = ?e.status(),
                    error = %e,
                    count = batch.len(),
                    "Webhook delivery failed"
                );
            }
        }
        result
    }
}
