//! Telemetry module
//!
//! Logging and Prometheus metrics

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Guard that keeps telemetry alive for the process lifetime
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems.
///
/// Must run inside a tokio runtime when a metrics port is configured.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_format)?;

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
        tracing::info!(port, "Prometheus exporter listening");
    }

    Ok(TelemetryGuard { _priv: () })
}
