//! Canonical update record and dedup key

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A normalized price/oracle update.
///
/// `value` is always a decimal string so large integer-encoded prices
/// survive untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Emitting contract, feed or address
    pub source_id: String,
    /// Ticker symbol (push feeds) or round identifier (log feeds)
    pub symbol_or_round: String,
    /// Decimal-precision value as received
    pub value: String,
    /// Unix timestamp (seconds)
    pub observed_at: i64,
}

/// Stable identifier of the originating event.
///
/// Never derived from [`Update`] contents: two distinct events may carry
/// identical values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// On-chain log position
    Log { tx_hash: String, log_index: u64 },
    /// Feed-provided sequence number, scoped to its source
    Sequence { source_id: String, seq: String },
}

impl DedupKey {
    pub fn log(tx_hash: &str, log_index: u64) -> Self {
        Self::Log {
            tx_hash: tx_hash.to_ascii_lowercase(),
            log_index,
        }
    }

    pub fn sequence(source_id: impl Into<String>, seq: impl Into<String>) -> Self {
        Self::Sequence {
            source_id: source_id.into(),
            seq: seq.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Log { tx_hash, log_index } => write!(f, "{tx_hash}:{log_index}"),
            DedupKey::Sequence { source_id, seq } => write!(f, "{source_id}#{seq}"),
        }
    }
}

/// Normalizer output: an update plus its dedup key, when the source gave one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub key: Option<DedupKey>,
    pub update: Update,
}

/// Chain and oracle filter for push frames.
///
/// A frame or item is only rejected when it names a chain or oracle that
/// does not match; untagged payloads always pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushFilter {
    chain: Option<String>,
    oracles: Vec<String>,
}

impl PushFilter {
    pub fn new(chain: Option<String>, oracles: Vec<String>) -> Self {
        Self {
            chain: chain
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty()),
            oracles: oracles
                .iter()
                .map(|o| o.trim().to_ascii_lowercase())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    /// Whether a payload's `chain` and `oracle` tags are acceptable
    pub fn admits(&self, payload: &Value) -> bool {
        if let (Some(expected), Some(chain)) =
            (&self.chain, payload.get("chain").and_then(Value::as_str))
        {
            if !chain.eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        if self.oracles.is_empty() {
            return true;
        }
        match payload.get("oracle").and_then(Value::as_str) {
            Some(oracle) => self.oracles.iter().any(|o| o.eq_ignore_ascii_case(oracle)),
            None => true,
        }
    }
}
