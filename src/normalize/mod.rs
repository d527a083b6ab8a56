//! Event normalization
//!
//! Maps push-feed frames and raw event logs onto the canonical [`Update`].
//! Field extraction never fails a whole frame: a record whose value cannot
//! be parsed is skipped and the rest of the frame is kept.

mod fields;
mod types;

pub use fields::{decimal_string, is_decimal_literal};
pub use types::{DedupKey, Normalized, PushFilter, Update};

use crate::clock::Clock;
use crate::source::{EventKind, RawLog};
use serde_json::Value;
use std::sync::Arc;

/// Field aliases for the price value in push frames, in lookup order
const VALUE_ALIASES: &[&str] = &["priceE6", "price_e6", "price"];
/// Field aliases for a feed-provided sequence number
const SEQUENCE_ALIASES: &[&str] = &["seq", "sequence", "id"];
/// Field aliases for the transaction hash of an on-chain origin
const TX_HASH_ALIASES: &[&str] = &["txHash", "transactionHash", "tx_hash"];
/// Field aliases for the log index of an on-chain origin
const LOG_INDEX_ALIASES: &[&str] = &["logIndex", "log_index"];

/// Converts raw source payloads into [`Normalized`] records
pub struct Normalizer {
    push_source_id: String,
    kinds: Vec<EventKind>,
    filter: PushFilter,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    /// `push_source_id` labels price-frame updates that carry no source of
    /// their own; `kinds` resolves log notifications arriving on the push path.
    pub fn new(
        push_source_id: impl Into<String>,
        kinds: Vec<EventKind>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            push_source_id: push_source_id.into(),
            kinds,
            filter: PushFilter::default(),
            clock,
        }
    }

    /// Drop push frames and items tagged with another chain or oracle
    pub fn with_filter(mut self, filter: PushFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Normalize one parsed push frame.
    ///
    /// Recognized shapes are price frames (`{"type":"prices","data":[...]}`)
    /// and log subscription notifications
    /// (`{"method":"eth_subscription","params":{"result":<log>}}`).
    /// Anything else yields nothing.
    pub fn normalize_frame(&self, frame: &Value) -> Vec<Normalized> {
        if !self.filter.admits(frame) {
            tracing::debug!(
                chain = ?frame.get("chain"),
                oracle = ?frame.get("oracle"),
                "Ignoring frame for another chain or oracle"
            );
            return Vec::new();
        }

        if frame.get("type").and_then(Value::as_str) == Some("prices") {
            let Some(items) = frame.get("data").and_then(Value::as_array) else {
                return Vec::new();
            };
            let frame_source = frame.get("source").and_then(Value::as_str);
            return items
                .iter()
                .filter(|item| self.filter.admits(item))
                .filter_map(|item| self.normalize_price_item(item, frame_source))
                .collect();
        }

        if frame.get("method").and_then(Value::as_str) == Some("eth_subscription") {
            let Some(result) = frame.pointer("/params/result") else {
                return Vec::new();
            };
            let log: RawLog = match serde_json::from_value(result.clone()) {
                Ok(log) => log,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed log notification");
                    return Vec::new();
                }
            };
            let Some(kind) = self.kinds.iter().find(|k| k.matches(&log.address, &log.topics))
            else {
                tracing::debug!(address = %log.address, "Log notification for untracked event");
                return Vec::new();
            };
            return self.normalize_log(kind, &log).into_iter().collect();
        }

        tracing::trace!("Ignoring unrecognized frame");
        Vec::new()
    }

    fn normalize_price_item(&self, item: &Value, frame_source: Option<&str>) -> Option<Normalized> {
        let Some(value) = fields::first_of(item, VALUE_ALIASES).and_then(fields::decimal_string)
        else {
            tracing::warn!(item = %item, "Skipping price item without a parseable value");
            return None;
        };

        let source_id = item
            .get("source")
            .and_then(Value::as_str)
            .or(frame_source)
            .unwrap_or(self.push_source_id.as_str())
            .to_string();
        let symbol = item
            .get("symbol")
            .and_then(fields::identifier)
            .unwrap_or_else(|| "unknown".to_string());
        let observed_at = item
            .get("ts")
            .and_then(fields::unix_seconds)
            .unwrap_or_else(|| self.clock.unix_seconds());

        let key = Self::origin_key(item)
            .or_else(|| {
                fields::first_of(item, SEQUENCE_ALIASES)
                    .and_then(fields::identifier)
                    .map(|seq| DedupKey::sequence(source_id.clone(), seq))
            });

        Some(Normalized {
            key,
            update: Update {
                source_id,
                symbol_or_round: symbol,
                value,
                observed_at,
            },
        })
    }

    /// On-chain origin carried by a push item, if any
    fn origin_key(item: &Value) -> Option<DedupKey> {
        let tx_hash = fields::first_of(item, TX_HASH_ALIASES)?.as_str()?;
        let log_index = fields::first_of(item, LOG_INDEX_ALIASES).and_then(fields::quantity)?;
        Some(DedupKey::log(tx_hash, log_index))
    }

    /// Normalize one raw log of a known event kind.
    ///
    /// Removed (reorged) logs and logs without a parseable value are skipped.
    pub fn normalize_log(&self, kind: &EventKind, log: &RawLog) -> Option<Normalized> {
        if log.removed {
            tracing::debug!(address = %log.address, "Skipping removed log");
            return None;
        }

        let decoded;
        let args = match &log.args {
            Some(args) => args,
            None => {
                decoded = fields::decode_words(&log.data);
                &decoded
            }
        };

        let Some(value) = fields::arg(args, &kind.value_arg.name, kind.value_arg.index)
            .and_then(fields::decimal_string)
        else {
            tracing::warn!(
                event = %kind.name,
                address = %log.address,
                tx_hash = ?log.transaction_hash,
                "Skipping log without a parseable value"
            );
            return None;
        };

        let block_number = log.block_number.as_ref().and_then(fields::quantity);

        let observed_at = kind
            .timestamp_arg
            .as_ref()
            .and_then(|a| fields::arg(args, &a.name, a.index))
            .and_then(fields::unix_seconds)
            .unwrap_or_else(|| self.clock.unix_seconds());

        let round = kind
            .round_arg
            .as_ref()
            .and_then(|a| fields::arg(args, &a.name, a.index))
            .and_then(|v| fields::decimal_string(v).or_else(|| fields::identifier(v)))
            .or_else(|| block_number.map(|b| b.to_string()))
            .unwrap_or_else(|| kind.name.clone());

        let key = match (&log.transaction_hash, log.log_index.as_ref().and_then(fields::quantity)) {
            (Some(tx_hash), Some(log_index)) => Some(DedupKey::log(tx_hash, log_index)),
            _ => None,
        };

        Some(Normalized {
            key,
            update: Update {
                source_id: log.address.to_ascii_lowercase(),
                symbol_or_round: round,
                value,
                observed_at,
            },
        })
    }
}
