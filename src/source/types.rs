//! Event source types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to one event argument, by name and by position.
///
/// Decoders deliver arguments either as a named map or as a positional
/// list, so both coordinates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgRef {
    pub name: String,
    pub index: usize,
}

impl ArgRef {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// A tracked on-chain event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKind {
    /// Human-readable event name (e.g. "PriceUpdated")
    pub name: String,
    /// Emitting contract addresses (empty = any address)
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Event signature topic; logs are not filtered by topic when absent
    #[serde(default)]
    pub topic0: Option<String>,
    /// Argument carrying the price value
    #[serde(default = "default_value_arg")]
    pub value_arg: ArgRef,
    /// Argument carrying the observation timestamp
    #[serde(default = "default_timestamp_arg")]
    pub timestamp_arg: Option<ArgRef>,
    /// Argument carrying the round identifier (block number when absent)
    #[serde(default)]
    pub round_arg: Option<ArgRef>,
}

fn default_value_arg() -> ArgRef {
    ArgRef::new("priceE6", 0)
}

fn default_timestamp_arg() -> Option<ArgRef> {
    Some(ArgRef::new("ts", 2))
}

impl EventKind {
    /// `PriceUpdated(uint256 priceE6, address updater, uint256 ts)`
    pub fn price_updated(addresses: Vec<String>) -> Self {
        Self {
            name: "PriceUpdated".to_string(),
            addresses,
            topic0: None,
            value_arg: default_value_arg(),
            timestamp_arg: default_timestamp_arg(),
            round_arg: None,
        }
    }

    /// Whether a log emitted by `address` with `topics` belongs to this kind
    pub fn matches(&self, address: &str, topics: &[String]) -> bool {
        let address_ok = self.addresses.is_empty()
            || self
                .addresses
                .iter()
                .any(|a| a.eq_ignore_ascii_case(address));
        let topic_ok = match &self.topic0 {
            Some(topic) => topics
                .first()
                .is_some_and(|t| t.eq_ignore_ascii_case(topic)),
            None => true,
        };
        address_ok && topic_ok
    }
}

/// A raw event log as returned by `eth_getLogs` or a log subscription.
///
/// Quantities are kept as JSON values because providers disagree on
/// hex-string versus integer encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: Option<Value>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub log_index: Option<Value>,
    /// Pre-decoded arguments (object = named, array = positional)
    #[serde(default)]
    pub args: Option<Value>,
    /// Set by providers when a log was dropped in a reorg
    #[serde(default)]
    pub removed: bool,
}

/// Event source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request header: {0}")]
    InvalidHeader(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_defaults_from_toml() {
        let kind: EventKind = toml::from_str(r#"name = "PriceUpdated""#).unwrap();
        assert_eq!(kind.value_arg, ArgRef::new("priceE6", 0));
        assert_eq!(kind.timestamp_arg, Some(ArgRef::new("ts", 2)));
        assert!(kind.round_arg.is_none());
        assert!(kind.addresses.is_empty());
    }

    #[test]
    fn test_event_kind_matches() {
        let mut kind = EventKind::price_updated(vec!["0xAbC".to_string()]);
        assert!(kind.matches("0xabc", &[]));
        assert!(!kind.matches("0xdef", &[]));

        kind.topic0 = Some("0x01".to_string());
        assert!(kind.matches("0xABC", &["0x01".to_string()]));
        assert!(!kind.matches("0xabc", &["0x02".to_string()]));
        assert!(!kind.matches("0xabc", &[]));
    }

    #[test]
    fn test_raw_log_deserialize() {
        let json = r#"{
            "address": "0xfeed",
            "topics": ["0x01"],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": "0xaa",
            "logIndex": "0x1"
        }"#;
        let log: RawLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.address, "0xfeed");
        assert_eq!(log.block_number, Some(Value::String("0x10".to_string())));
        assert!(!log.removed);
        assert!(log.args.is_none());
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Rpc {
            code: -32000,
            message: "header not found".to_string(),
        };
        assert_eq!(err.to_string(), "RPC error -32000: header not found");
    }
}
