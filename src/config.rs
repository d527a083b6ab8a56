//! Configuration types for oracle-relay
//!
//! Loaded from TOML, then overridden by the environment variables the relay
//! has always honoured (`WS_URL`, `WEBHOOK_URL`, ...), then validated.

use crate::dedup::DEFAULT_SEEN_CAP;
use crate::normalize::PushFilter;
use crate::poll::DEFAULT_SAFETY_MARGIN;
use crate::source::EventKind;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::time::Duration;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub poll: Option<PollConfig>,
    /// Tracked on-chain event kinds, shared by push log notifications and the poller
    #[serde(default)]
    pub events: Vec<EventKind>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Push subscription configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// WebSocket URL of the feed
    #[serde(default)]
    pub url: String,
    /// Origin header; derived from `url` when unset
    #[serde(default)]
    pub origin: Option<String>,
    /// Source label for price frames that carry none
    #[serde(default = "default_push_source_id")]
    pub source_id: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Text frame sent after each successful open
    #[serde(default)]
    pub subscribe_message: Option<String>,
    /// Drop frames tagged with another chain
    #[serde(default)]
    pub chain: Option<String>,
    /// Drop frames tagged with an oracle outside this list (empty = any)
    #[serde(default)]
    pub oracles: Vec<String>,
}

fn default_push_source_id() -> String {
    "push".to_string()
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_heartbeat_secs() -> u64 {
    60
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            origin: None,
            source_id: default_push_source_id(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            subscribe_message: None,
            chain: None,
            oracles: Vec::new(),
        }
    }
}

impl PushConfig {
    /// Origin header value: explicit setting, else the URL's host over http(s)
    pub fn effective_origin(&self) -> String {
        if let Some(origin) = self.origin.as_ref().filter(|o| !o.is_empty()) {
            return origin.clone();
        }
        let (scheme, rest) = self.url.split_once("://").unwrap_or(("wss", self.url.as_str()));
        let host = rest.split('/').next().unwrap_or_default();
        let scheme = if scheme.eq_ignore_ascii_case("ws") { "http" } else { "https" };
        format!("{scheme}://{host}")
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Chain and oracle filter for incoming frames
    pub fn filter(&self) -> PushFilter {
        PushFilter::new(self.chain.clone(), self.oracles.clone())
    }
}

/// Log poller (backstop) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// JSON-RPC endpoint
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Blocks behind the head to start from at startup
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u64,
}

fn default_poll_interval_secs() -> u64 {
    3
}
fn default_safety_margin() -> u64 {
    DEFAULT_SAFETY_MARGIN
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            interval_secs: default_poll_interval_secs(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Webhook receiver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    /// Shared secret for `x-signature`; unsigned when unset
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Rollup window in seconds (0 = post every admission)
    #[serde(default)]
    pub rollup_window_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: None,
            timeout_secs: default_timeout_secs(),
            rollup_window_secs: 0,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dedup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_seen_cap")]
    pub seen_cap: usize,
}

fn default_seen_cap() -> usize {
    DEFAULT_SEEN_CAP
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            seen_cap: DEFAULT_SEEN_CAP,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, rest)| {
            !rest.is_empty() && schemes.iter().any(|s| scheme.eq_ignore_ascii_case(s))
        })
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields `None`.
    ///
    /// A file that exists and fails to read or parse is still an error.
    pub fn load_optional(path: impl AsRef<std::path::Path>) -> Result<Option<Self>, ConfigError> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("WS_URL") {
            self.push.url = url;
        }
        if let Some(origin) = get("WS_ORIGIN") {
            self.push.origin = Some(origin);
        }
        if let Some(url) = get("WEBHOOK_URL") {
            self.webhook.url = url;
        }
        if let Some(secret) = get("WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
        if let Some(window) = get("ROLLUP_WINDOW_SEC") {
            self.webhook.rollup_window_secs =
                window.parse().map_err(|_| ConfigError::Invalid {
                    field: "ROLLUP_WINDOW_SEC",
                    reason: format!("not a whole number of seconds: {window}"),
                })?;
        }
        if let Some(url) = get("HTTP_URL") {
            self.poll.get_or_insert_with(PollConfig::default).rpc_url = url;
        }
        if let Some(chain) = get("CHAIN") {
            self.push.chain = Some(chain);
        }
        if let Some(oracles) = get("ORACLES") {
            let addresses: Vec<String> = oracles
                .split(',')
                .map(|a| a.trim().to_ascii_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
            if self.push.oracles.is_empty() {
                self.push.oracles = addresses.clone();
            }
            if self.events.is_empty() {
                self.events.push(EventKind::price_updated(addresses));
            }
        }
        Ok(())
    }

    /// Check that everything needed to start is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push.url.is_empty() {
            return Err(ConfigError::Missing("push.url (WS_URL)"));
        }
        if !has_scheme(&self.push.url, &["ws", "wss"]) {
            return Err(ConfigError::Invalid {
                field: "push.url",
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }
        if self.webhook.url.is_empty() {
            return Err(ConfigError::Missing("webhook.url (WEBHOOK_URL)"));
        }
        if !has_scheme(&self.webhook.url, &["http", "https"]) {
            return Err(ConfigError::Invalid {
                field: "webhook.url",
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }
        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "webhook.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.push.reconnect_delay_secs == 0 || self.push.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "push",
                reason: "reconnect and heartbeat intervals must be positive".to_string(),
            });
        }
        if self.dedup.seen_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "dedup.seen_cap",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(poll) = &self.poll {
            if poll.rpc_url.is_empty() {
                return Err(ConfigError::Missing("poll.rpc_url (HTTP_URL)"));
            }
            if !has_scheme(&poll.rpc_url, &["http", "https"]) {
                return Err(ConfigError::Invalid {
                    field: "poll.rpc_url",
                    reason: "expected an http:// or https:// URL".to_string(),
                });
            }
            if self.events.is_empty() {
                return Err(ConfigError::Missing("events (ORACLES)"));
            }
            if poll.interval_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "poll.interval_secs",
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Event kinds resolving pushed log notifications and polled ranges
    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.events.clone()
    }
}
