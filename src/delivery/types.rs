//! Delivery types

use super::signature::SignatureError;
use crate::normalize::Update;
use serde::Serialize;

/// Webhook body: `{ "ts": <unix-seconds>, "updates": [...] }`
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub ts: i64,
    pub updates: &'a [Update],
}

/// A request ready to post: exact body bytes plus headers
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Delivery failures. None of these carry the shared secret.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("signing error: {0}")]
    Signing(#[from] SignatureError),

    #[error("receiver returned status {status}")]
    Status { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// HTTP status for non-2xx failures
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status } => Some(*status),
            _ => None,
        }
    }
}
