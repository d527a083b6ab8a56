//! Configuration loading tests against the shipped example

use oracle_relay::config::{Config, ConfigError};
use oracle_relay::rollup::FlushMode;
use oracle_relay::telemetry::LogFormat;
use std::collections::HashMap;
use std::time::Duration;

const EXAMPLE: &str = include_str!("../../config.toml.example");

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_example_config_loads_and_validates() {
    let config = Config::from_toml_str(EXAMPLE).unwrap();
    config.validate().unwrap();

    assert_eq!(config.push.reconnect_delay(), Duration::from_secs(5));
    assert_eq!(config.push.effective_origin(), "https://feed.example.com");
    assert_eq!(config.webhook.timeout(), Duration::from_secs(10));
    assert_eq!(
        FlushMode::from_window_secs(config.webhook.rollup_window_secs),
        FlushMode::Immediate
    );
    assert_eq!(config.dedup.seen_cap, 5000);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);

    let kinds = config.event_kinds();
    assert_eq!(kinds.len(), 1);
    assert_eq!(kinds[0].name, "PriceUpdated");
    assert_eq!(kinds[0].value_arg.index, 0);
}

#[test]
fn test_environment_only_deployment() {
    let mut config = Config::default();
    config
        .apply_env(env(&[
            ("WS_URL", "wss://feed.example.com/prices"),
            ("WS_ORIGIN", "https://app.example.com"),
            ("HTTP_URL", "https://rpc.example.com"),
            ("ORACLES", "0xfeed1, 0xfeed2"),
            ("WEBHOOK_URL", "https://receiver.example.com/hook"),
            ("WEBHOOK_SECRET", "s"),
            ("ROLLUP_WINDOW_SEC", "2"),
        ]))
        .unwrap();

    config.validate().unwrap();
    assert_eq!(config.push.effective_origin(), "https://app.example.com");
    assert_eq!(
        FlushMode::from_window_secs(config.webhook.rollup_window_secs),
        FlushMode::Windowed(Duration::from_secs(2))
    );
    let kinds = config.event_kinds();
    assert_eq!(kinds[0].addresses, vec!["0xfeed1", "0xfeed2"]);
}

#[test]
fn test_missing_endpoints_are_fatal() {
    let config = Config::default();
    assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

    let mut config = Config::default();
    config
        .apply_env(env(&[("WS_URL", "wss://feed.example.com/ws")]))
        .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
}
