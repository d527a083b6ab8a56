//! JSON-RPC log source (`eth_blockNumber` / `eth_getLogs`)

use super::{EventKind, LogSource, RawLog, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default request timeout for RPC calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Log source backed by an Ethereum-style JSON-RPC endpoint
pub struct JsonRpcLogSource {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcLogSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Transport(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let response: RpcResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| SourceError::InvalidResponse(format!("{method}: missing result")))
    }
}

/// Build the `eth_getLogs` filter object for one event kind
pub(crate) fn log_filter(from: u64, to: u64, kind: &EventKind) -> Value {
    let mut filter = json!({
        "fromBlock": format!("{from:#x}"),
        "toBlock": format!("{to:#x}"),
    });
    if !kind.addresses.is_empty() {
        filter["address"] = json!(kind.addresses);
    }
    if let Some(topic) = &kind.topic0 {
        filter["topics"] = json!([topic]);
    }
    filter
}

/// Parse a `0x`-prefixed hex quantity
pub(crate) fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

#[async_trait]
impl LogSource for JsonRpcLogSource {
    async fn current_position(&self) -> Result<u64, SourceError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(parse_hex_quantity)
            .ok_or_else(|| SourceError::InvalidResponse(format!("bad block number: {result}")))
    }

    async fn get_events(
        &self,
        from: u64,
        to: u64,
        kind: &EventKind,
    ) -> Result<Vec<RawLog>, SourceError> {
        let filter = log_filter(from, to, kind);
        let result = self.call("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result).map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }
}
