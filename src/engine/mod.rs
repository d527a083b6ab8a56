//! Relay engine
//!
//! One processing loop owns the normalizer, the dedup filter, the rollup
//! buffer and the flush scheduler. Sources never touch that state directly:
//! they send [`IngestEvent`]s over a channel, so "admit + append" is always
//! a single step of a single writer.

mod types;

pub use types::{
    ingest_channel, IngestEvent, IngestReceiver, IngestSender, ShutdownReport,
    DEFAULT_INGEST_BUFFER,
};

use crate::dedup::{Admission, DedupFilter};
use crate::delivery::{DeliveryEngine, DeliveryError};
use crate::normalize::{Normalized, Normalizer, Update};
use crate::rollup::{BufferDepth, FlushMode, FlushTrigger, RollupBuffer, RollupScheduler};
use crate::source::{EventKind, RawLog};
use crate::telemetry::{increment_counter, set_gauge, CounterMetric, GaugeMetric};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Outcome of one delivery task
struct DeliveryReport {
    batch: Vec<Update>,
    result: Result<u16, DeliveryError>,
}

/// What the loop does after one wake-up
enum Step {
    Continue,
    Stop(Option<oneshot::Sender<ShutdownReport>>),
}

/// Cloneable handle for feeding and stopping a running [`Engine`]
#[derive(Clone)]
pub struct EngineHandle {
    tx: IngestSender,
    depth: BufferDepth,
}

impl EngineHandle {
    /// Sender for ingestion sources
    pub fn sender(&self) -> IngestSender {
        self.tx.clone()
    }

    /// Shared view of the current buffer depth
    pub fn depth(&self) -> BufferDepth {
        self.depth.clone()
    }

    /// Ask the engine to flush what it holds and stop.
    ///
    /// Returns `None` if the engine had already stopped.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(IngestEvent::Shutdown(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}

/// Single-writer processing loop
pub struct Engine {
    normalizer: Normalizer,
    dedup: DedupFilter,
    buffer: RollupBuffer,
    scheduler: RollupScheduler,
    triggers: mpsc::UnboundedReceiver<FlushTrigger>,
    delivery: Arc<DeliveryEngine>,
    depth: BufferDepth,
    ingest_rx: IngestReceiver,
    reports_tx: mpsc::UnboundedSender<DeliveryReport>,
    reports_rx: mpsc::UnboundedReceiver<DeliveryReport>,
}

impl Engine {
    pub fn new(
        normalizer: Normalizer,
        dedup: DedupFilter,
        mode: FlushMode,
        delivery: Arc<DeliveryEngine>,
    ) -> (Self, EngineHandle) {
        let (tx, ingest_rx) = ingest_channel();
        let (scheduler, triggers) = RollupScheduler::new(mode);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let depth = BufferDepth::new();

        let engine = Self {
            normalizer,
            dedup,
            buffer: RollupBuffer::new(),
            scheduler,
            triggers,
            delivery,
            depth: depth.clone(),
            ingest_rx,
            reports_tx,
            reports_rx,
        };
        (engine, EngineHandle { tx, depth })
    }

    /// Process events until shut down or every sender is gone
    pub async fn run(mut self) -> ShutdownReport {
        tracing::info!(
            mode = ?self.scheduler.mode(),
            webhook = %self.delivery.url(),
            signing = self.delivery.is_signing(),
            "Engine started"
        );

        loop {
            let step = tokio::select! {
                Some(report) = self.reports_rx.recv() => {
                    self.on_delivery_report(report);
                    Step::Continue
                }
                Some(trigger) = self.triggers.recv() => {
                    self.scheduler.on_trigger(trigger);
                    Step::Continue
                }
                event = self.ingest_rx.recv() => self.on_ingest(event),
            };

            match step {
                Step::Continue => self.maybe_flush(),
                Step::Stop(reply) => {
                    let report = self.shutdown().await;
                    if let Some(reply) = reply {
                        let _ = reply.send(report);
                    }
                    return report;
                }
            }
        }
    }

    /// Handle one received event plus everything already queued behind it
    fn on_ingest(&mut self, first: Option<IngestEvent>) -> Step {
        let mut next = first;
        loop {
            match next {
                None => return Step::Stop(None),
                Some(IngestEvent::Shutdown(reply)) => return Step::Stop(Some(reply)),
                Some(IngestEvent::Frame(frame)) => {
                    let records = self.normalizer.normalize_frame(&frame);
                    self.admit_all(records);
                }
                Some(IngestEvent::Logs { kind, logs }) => self.ingest_logs(&kind, &logs),
            }

            next = match self.ingest_rx.try_recv() {
                Ok(event) => Some(event),
                Err(_) => return Step::Continue,
            };
        }
    }

    fn ingest_logs(&mut self, kind: &EventKind, logs: &[RawLog]) {
        let records: Vec<Normalized> = logs
            .iter()
            .filter_map(|log| self.normalizer.normalize_log(kind, log))
            .collect();
        self.admit_all(records);
    }

    fn admit_all(&mut self, records: Vec<Normalized>) {
        if records.is_empty() {
            return;
        }

        let mut admitted = 0u64;
        let mut duplicates = 0u64;
        for Normalized { key, update } in records {
            let admission = match key {
                Some(key) => self.dedup.record_once(key, update, &mut self.buffer),
                None => self.dedup.admit_unkeyed(update, &mut self.buffer),
            };
            match admission {
                Admission::Admitted => {
                    admitted += 1;
                    self.scheduler.on_admit();
                }
                Admission::Duplicate => duplicates += 1,
            }
        }

        increment_counter(CounterMetric::UpdatesAdmitted, admitted);
        increment_counter(CounterMetric::DuplicatesDropped, duplicates);
        set_gauge(GaugeMetric::SeenSetSize, self.dedup.seen().len() as f64);
        self.publish_depth();
    }

    /// Start a delivery if one is due and none is in flight
    fn maybe_flush(&mut self) {
        if !self.scheduler.take_flush() || self.buffer.is_empty() {
            return;
        }

        let batch = self.buffer.drain_all();
        self.publish_depth();
        self.scheduler.begin_delivery();
        tracing::debug!(count = batch.len(), "Flushing rollup buffer");

        let delivery = self.delivery.clone();
        let reports_tx = self.reports_tx.clone();
        tokio::spawn(async move {
            let result = delivery.deliver(&batch).await;
            let _ = reports_tx.send(DeliveryReport { batch, result });
        });
    }

    fn on_delivery_report(&mut self, report: DeliveryReport) {
        self.scheduler.end_delivery();
        let DeliveryReport { batch, result } = report;

        match result {
            Ok(_) => increment_counter(CounterMetric::BatchesDelivered, 1),
            Err(_) => {
                increment_counter(CounterMetric::BatchesFailed, 1);
                tracing::warn!(
                    requeued = batch.len(),
                    buffered = self.buffer.len(),
                    "Batch requeued for the next flush"
                );
                self.buffer.requeue_front(batch);
                self.publish_depth();
            }
        }
    }

    /// Wait for the in-flight delivery, then make one last attempt
    async fn shutdown(&mut self) -> ShutdownReport {
        while self.scheduler.in_flight() {
            match self.reports_rx.recv().await {
                Some(report) => self.on_delivery_report(report),
                None => break,
            }
        }

        let mut report = ShutdownReport::default();
        if !self.buffer.is_empty() {
            let batch = self.buffer.drain_all();
            match self.delivery.deliver(&batch).await {
                Ok(_) => {
                    increment_counter(CounterMetric::BatchesDelivered, 1);
                    report.delivered = batch.len();
                }
                Err(_) => {
                    increment_counter(CounterMetric::BatchesFailed, 1);
                    self.buffer.requeue_front(batch);
                }
            }
        }
        report.undelivered = self.buffer.len();
        self.publish_depth();

        tracing::info!(
            delivered = report.delivered,
            undelivered = report.undelivered,
            "Engine stopped"
        );
        report
    }

    fn publish_depth(&self) {
        let depth = self.buffer.len();
        self.depth.set(depth);
        set_gauge(GaugeMetric::BufferDepth, depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::{WebhookRequest, WebhookTransport};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Receiver double: answers with scripted statuses (200 once exhausted)
    #[derive(Default)]
    struct ScriptedReceiver {
        statuses: Mutex<VecDeque<u16>>,
        posts: Mutex<Vec<(Instant, Vec<Update>)>>,
    }

    impl ScriptedReceiver {
        fn failing_first(count: usize) -> Arc<Self> {
            let receiver = Self::default();
            receiver
                .statuses
                .lock()
                .unwrap()
                .extend(std::iter::repeat(503).take(count));
            Arc::new(receiver)
        }

        fn posts(&self) -> Vec<(Instant, Vec<Update>)> {
            self.posts.lock().unwrap().clone()
        }

        fn symbols(&self) -> Vec<Vec<String>> {
            self.posts()
                .into_iter()
                .map(|(_, batch)| batch.into_iter().map(|u| u.symbol_or_round).collect())
                .collect()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedReceiver {
        async fn post(&self, _url: &str, request: &WebhookRequest) -> Result<u16, DeliveryError> {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let updates: Vec<Update> = serde_json::from_value(body["updates"].clone()).unwrap();
            self.posts.lock().unwrap().push((Instant::now(), updates));
            Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(200))
        }
    }

    fn start(receiver: Arc<ScriptedReceiver>, mode: FlushMode) -> EngineHandle {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let kinds = vec![EventKind::price_updated(vec!["0xfeed".into()])];
        let normalizer = Normalizer::new("push", kinds, clock.clone());
        let delivery = Arc::new(DeliveryEngine::new(
            "http://receiver.test/hook",
            Some("s".into()),
            receiver,
            clock,
        ));
        let (engine, handle) = Engine::new(normalizer, DedupFilter::default(), mode, delivery);
        tokio::spawn(engine.run());
        handle
    }

    fn prices(items: &[(&str, u64)]) -> IngestEvent {
        let data: Vec<Value> = items
            .iter()
            .map(|(symbol, seq)| {
                json!({"symbol": symbol, "priceE6": "1000000", "ts": 1_700_000_000, "seq": seq})
            })
            .collect();
        IngestEvent::Frame(json!({"type": "prices", "data": data}))
    }

    fn chain_log(tx: &str, log_index: u64) -> RawLog {
        RawLog {
            address: "0xFEED".into(),
            topics: vec![],
            data: "0x".into(),
            block_number: Some(json!("0x64")),
            transaction_hash: Some(tx.into()),
            log_index: Some(json!(log_index)),
            args: Some(json!({"priceE6": "65000000", "ts": 1_700_000_000})),
            removed: false,
        }
    }

    fn assert_fired_near(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "fired at {elapsed:?}, expected {expected:?}"
        );
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_admission_order() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Immediate);
        let tx = handle.sender();

        tx.send(prices(&[("A", 1), ("B", 2)])).await.unwrap();
        settle().await;
        tx.send(prices(&[("C", 3)])).await.unwrap();
        settle().await;

        let delivered: Vec<String> = receiver.symbols().concat();
        assert_eq!(delivered, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_event_from_both_paths_delivered_once() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Immediate);
        let tx = handle.sender();
        let log = chain_log("0xABC", 2);

        let notification = json!({
            "method": "eth_subscription",
            "params": {"result": serde_json::to_value(&log).unwrap()}
        });
        tx.send(IngestEvent::Frame(notification)).await.unwrap();
        settle().await;
        tx.send(IngestEvent::Logs {
            kind: EventKind::price_updated(vec!["0xfeed".into()]),
            logs: vec![chain_log("0xabc", 2), chain_log("0xabc", 3)],
        })
        .await
        .unwrap();
        settle().await;

        let posts = receiver.posts();
        let total: usize = posts.iter().map(|(_, batch)| batch.len()).sum();
        assert_eq!(total, 2);
        assert_eq!(posts[0].1[0].value, "65000000");
        assert_eq!(posts[0].1[0].source_id, "0xfeed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_sequence_in_one_frame_dropped() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Immediate);

        handle.sender().send(prices(&[("A", 7), ("A", 7)])).await.unwrap();
        settle().await;

        assert_eq!(receiver.symbols(), vec![vec!["A".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_retried_ahead_of_newer_updates() {
        let receiver = ScriptedReceiver::failing_first(1);
        let handle = start(receiver.clone(), FlushMode::Immediate);
        let tx = handle.sender();

        tx.send(prices(&[("A", 1), ("B", 2)])).await.unwrap();
        settle().await;
        assert_eq!(handle.depth().get(), 2);

        tx.send(prices(&[("C", 3)])).await.unwrap();
        settle().await;

        assert_eq!(receiver.symbols(), vec![vec!["A", "B"], vec!["A", "B", "C"]]);
        assert_eq!(handle.depth().get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_schedules_no_retry_by_itself() {
        let receiver = ScriptedReceiver::failing_first(1);
        let handle = start(receiver.clone(), FlushMode::Immediate);

        handle.sender().send(prices(&[("A", 1)])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(receiver.posts().len(), 1);
        assert_eq!(handle.depth().get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windowed_rollup_coalesces_into_one_flush() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Windowed(Duration::from_secs(2)));
        let tx = handle.sender();
        let t0 = Instant::now();

        tx.send(prices(&[("A", 1)])).await.unwrap();
        tokio::time::sleep_until(t0 + Duration::from_millis(500)).await;
        tx.send(prices(&[("B", 2)])).await.unwrap();
        tokio::time::sleep_until(t0 + Duration::from_millis(1900)).await;
        tx.send(prices(&[("C", 3)])).await.unwrap();

        tokio::time::sleep_until(t0 + Duration::from_millis(1990)).await;
        assert!(receiver.posts().is_empty());

        tokio::time::sleep_until(t0 + Duration::from_millis(2100)).await;
        let posts = receiver.posts();
        assert_eq!(posts.len(), 1);
        assert_fired_near(posts[0].0 - t0, Duration::from_secs(2));
        assert_eq!(receiver.symbols(), vec![vec!["A", "B", "C"]]);

        tx.send(prices(&[("D", 4)])).await.unwrap();
        tokio::time::sleep_until(t0 + Duration::from_millis(4000)).await;
        assert_eq!(receiver.posts().len(), 1);

        tokio::time::sleep_until(t0 + Duration::from_millis(4200)).await;
        let posts = receiver.posts();
        assert_eq!(posts.len(), 2);
        assert_fired_near(posts[1].0 - t0, Duration::from_millis(4100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_mode_coalesces_same_tick() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Immediate);
        let tx = handle.sender();

        tx.send(prices(&[("A", 1)])).await.unwrap();
        tx.send(prices(&[("B", 2)])).await.unwrap();
        tx.send(prices(&[("C", 3)])).await.unwrap();
        settle().await;

        assert_eq!(receiver.posts().len(), 1);
        assert_eq!(receiver.symbols()[0], vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_frames_do_not_flush() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Immediate);

        handle
            .sender()
            .send(IngestEvent::Frame(json!({"type": "heartbeat"})))
            .await
            .unwrap();
        settle().await;

        assert!(receiver.posts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_open_window() {
        let receiver = Arc::new(ScriptedReceiver::default());
        let handle = start(receiver.clone(), FlushMode::Windowed(Duration::from_secs(60)));

        handle.sender().send(prices(&[("A", 1), ("B", 2)])).await.unwrap();
        let report = handle.shutdown().await.unwrap();

        assert_eq!(report, ShutdownReport { delivered: 2, undelivered: 0 });
        assert_eq!(receiver.posts().len(), 1);
        assert!(handle.shutdown().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_undelivered_on_failure() {
        let receiver = ScriptedReceiver::failing_first(2);
        let handle = start(receiver.clone(), FlushMode::Immediate);

        handle.sender().send(prices(&[("A", 1)])).await.unwrap();
        settle().await;
        let report = handle.shutdown().await.unwrap();

        assert_eq!(report, ShutdownReport { delivered: 0, undelivered: 1 });
        assert_eq!(receiver.posts().len(), 2);
    }
}
