//! Prometheus metrics

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Updates appended to the rollup buffer
    UpdatesAdmitted,
    /// Updates dropped as duplicates
    DuplicatesDropped,
    /// Push frames that were not valid JSON
    MalformedFrames,
    /// Batches accepted by the receiver
    BatchesDelivered,
    /// Batches requeued after a failed post
    BatchesFailed,
    /// Push connection attempts after a close
    Reconnects,
    /// Poll iterations that failed
    PollErrors,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Updates waiting in the rollup buffer
    BufferDepth,
    /// Keys in the seen-set
    SeenSetSize,
    /// Poll high-water mark
    PollHighWater,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Webhook post round trip
    Delivery,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::UpdatesAdmitted => "relay_updates_admitted_total",
        CounterMetric::DuplicatesDropped => "relay_duplicates_dropped_total",
        CounterMetric::MalformedFrames => "relay_malformed_frames_total",
        CounterMetric::BatchesDelivered => "relay_batches_delivered_total",
        CounterMetric::BatchesFailed => "relay_batches_failed_total",
        CounterMetric::Reconnects => "relay_reconnects_total",
        CounterMetric::PollErrors => "relay_poll_errors_total",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::BufferDepth => "relay_buffer_depth",
        GaugeMetric::SeenSetSize => "relay_seen_set_size",
        GaugeMetric::PollHighWater => "relay_poll_high_water",
    }
}

/// Increment a counter
pub fn increment_counter(metric: CounterMetric, value: u64) {
    ::metrics::counter!(counter_name(metric)).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(gauge_name(metric)).set(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::Delivery => "relay_delivery_latency_ms",
    };
    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}
