//! HTTP transport for webhook posts

use super::types::{DeliveryError, WebhookRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Posts a prepared request and reports the HTTP status
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, request: &WebhookRequest) -> Result<u16, DeliveryError>;
}

/// reqwest-backed transport with a bounded timeout
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, request: &WebhookRequest) -> Result<u16, DeliveryError> {
        let mut builder = self.client.post(url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    // Strip the URL so query-string credentials stay out of logs
                    DeliveryError::Transport(e.without_url().to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}
