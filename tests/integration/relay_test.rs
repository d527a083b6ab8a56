//! End-to-end relay tests with in-memory sources and receiver

use async_trait::async_trait;
use futures_util::StreamExt;
use oracle_relay::clock::ManualClock;
use oracle_relay::dedup::DedupFilter;
use oracle_relay::delivery::{
    verify_signature, DeliveryEngine, DeliveryError, WebhookRequest, WebhookTransport,
    SIGNATURE_HEADER,
};
use oracle_relay::engine::{Engine, EngineHandle, ShutdownReport};
use oracle_relay::normalize::{Normalizer, Update};
use oracle_relay::poll::PollSource;
use oracle_relay::rollup::{BufferDepth, FlushMode};
use oracle_relay::source::{EventKind, FrameStream, LogSource, PushSource, RawLog, SourceError};
use oracle_relay::ws::{ConnectionState, ConnectionSupervisor, SupervisorConfig};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const ORACLE: &str = "0x00000000000000000000000000000000000feed1";
const SECRET: &str = "relay-secret";

type FrameTx = mpsc::UnboundedSender<Result<String, SourceError>>;

#[derive(Default)]
struct FakeFeed {
    connections: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String, SourceError>>>>,
}

impl FakeFeed {
    fn connection(&self) -> FrameTx {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl PushSource for FakeFeed {
    async fn open(&self) -> Result<FrameStream, SourceError> {
        let rx = self
            .connections
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SourceError::Transport("refused".into()))?;
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

struct FakeChain {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
}

impl FakeChain {
    fn new(head: u64, logs: Vec<RawLog>) -> Arc<Self> {
        Arc::new(Self {
            head: AtomicU64::new(head),
            logs: Mutex::new(logs),
        })
    }
}

#[async_trait]
impl LogSource for FakeChain {
    async fn current_position(&self) -> Result<u64, SourceError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_events(
        &self,
        from: u64,
        to: u64,
        kind: &EventKind,
    ) -> Result<Vec<RawLog>, SourceError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| kind.matches(&log.address, &log.topics))
            .filter(|log| {
                let block = log
                    .block_number
                    .as_ref()
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                (from..=to).contains(&block)
            })
            .cloned()
            .collect())
    }
}

/// Receiver that checks every signature against the exact posted bytes
#[derive(Default)]
struct VerifyingReceiver {
    statuses: Mutex<VecDeque<u16>>,
    batches: Mutex<Vec<Vec<Update>>>,
}

impl VerifyingReceiver {
    fn batches(&self) -> Vec<Vec<Update>> {
        self.batches.lock().unwrap().clone()
    }

    fn delivered(&self) -> Vec<Update> {
        self.batches().concat()
    }
}

#[async_trait]
impl WebhookTransport for VerifyingReceiver {
    async fn post(&self, _url: &str, request: &WebhookRequest) -> Result<u16, DeliveryError> {
        let header = request.header(SIGNATURE_HEADER).expect("signed request");
        verify_signature(SECRET.as_bytes(), &request.body, header).expect("valid signature");
        assert_eq!(request.header("content-type"), Some("application/json"));

        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["ts"], 1_700_000_000);
        let updates: Vec<Update> = serde_json::from_value(body["updates"].clone()).unwrap();
        self.batches.lock().unwrap().push(updates);
        Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(200))
    }
}

fn price_log(tx: &str, block: u64, price: u64) -> RawLog {
    let word = |v: u64| format!("{v:064x}");
    RawLog {
        address: ORACLE.into(),
        topics: vec![],
        data: format!("0x{}{}{}", word(price), word(0), word(1_700_000_000)),
        block_number: Some(json!(block)),
        transaction_hash: Some(tx.into()),
        log_index: Some(json!("0x0")),
        args: None,
        removed: false,
    }
}

fn notification(log: &RawLog) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": {"subscription": "0x1", "result": log},
    })
    .to_string()
}

struct Relay {
    handle: EngineHandle,
    state: tokio::sync::watch::Receiver<ConnectionState>,
}

fn start_relay(
    feed: Arc<FakeFeed>,
    chain: Arc<FakeChain>,
    receiver: Arc<VerifyingReceiver>,
    mode: FlushMode,
) -> Relay {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let kinds = vec![EventKind::price_updated(vec![ORACLE.into()])];
    let normalizer = Normalizer::new("prices-feed", kinds.clone(), clock.clone());
    let delivery = Arc::new(DeliveryEngine::new(
        "http://receiver.test/hook",
        Some(SECRET.into()),
        receiver,
        clock,
    ));
    let (engine, handle) = Engine::new(normalizer, DedupFilter::default(), mode, delivery);
    tokio::spawn(engine.run());

    let supervisor = ConnectionSupervisor::new(
        feed,
        SupervisorConfig::default(),
        handle.sender(),
        handle.depth(),
    );
    let state = supervisor.state();
    tokio::spawn(supervisor.run());

    let poller = PollSource::new(chain, kinds, Duration::from_secs(3), 10, handle.sender());
    tokio::spawn(poller.run());

    Relay { handle, state }
}

#[tokio::test(start_paused = true)]
async fn test_event_seen_by_both_paths_is_delivered_once() {
    let feed = Arc::new(FakeFeed::default());
    let conn = feed.connection();
    let shared = price_log("0xaaaa", 95, 65_000_000);
    let missed = price_log("0xbbbb", 96, 65_100_000);
    let chain = FakeChain::new(100, vec![shared.clone(), missed]);
    let receiver = Arc::new(VerifyingReceiver::default());

    let window = FlushMode::Windowed(Duration::from_secs(1));
    let relay = start_relay(feed, chain, receiver.clone(), window);

    conn.send(Ok(notification(&shared))).unwrap();
    let auxg = json!({
        "type": "prices",
        "data": [{"symbol": "AUXG", "priceE6": "2400000000", "ts": 1_700_000_000, "seq": 1}],
    });
    conn.send(Ok(auxg.to_string())).unwrap();
    conn.send(Ok("{not json".into())).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let delivered = receiver.delivered();
    assert_eq!(receiver.batches().len(), 1);
    assert_eq!(delivered.len(), 3);

    let mut values: Vec<&str> = delivered.iter().map(|u| u.value.as_str()).collect();
    values.sort_unstable();
    assert_eq!(values, vec!["2400000000", "65000000", "65100000"]);

    let auxg = delivered.iter().find(|u| u.symbol_or_round == "AUXG").unwrap();
    assert_eq!(auxg.source_id, "prices-feed");
    let polled = delivered.iter().find(|u| u.value == "65100000").unwrap();
    assert_eq!(polled.symbol_or_round, "96");
    assert_eq!(polled.source_id, ORACLE);

    assert_eq!(*relay.state.borrow(), ConnectionState::Open);
    assert_eq!(relay.handle.shutdown().await, Some(ShutdownReport::default()));
}

#[tokio::test(start_paused = true)]
async fn test_gap_during_reconnect_backfilled_by_poller() {
    let feed = Arc::new(FakeFeed::default());
    let first = feed.connection();
    let second = feed.connection();
    let chain = FakeChain::new(100, vec![]);
    let receiver = Arc::new(VerifyingReceiver::default());

    let mut relay = start_relay(feed, chain.clone(), receiver.clone(), FlushMode::Immediate);
    relay.state.wait_for(|s| *s == ConnectionState::Open).await.unwrap();

    // Feed drops; an event lands on chain while it is down
    drop(first);
    relay.state.wait_for(|s| *s == ConnectionState::Disconnected).await.unwrap();
    let during_gap = price_log("0xcccc", 101, 65_200_000);
    chain.logs.lock().unwrap().push(during_gap.clone());
    chain.head.store(101, Ordering::SeqCst);

    // Reconnected feed replays the same event later
    relay.state.wait_for(|s| *s == ConnectionState::Open).await.unwrap();
    second.send(Ok(notification(&during_gap))).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let delivered = receiver.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].value, "65200000");
    assert_eq!(delivered[0].symbol_or_round, "101");
}

#[tokio::test(start_paused = true)]
async fn test_receiver_outage_recovers_without_loss() {
    let feed = Arc::new(FakeFeed::default());
    let conn = feed.connection();
    let chain = FakeChain::new(100, vec![]);
    let receiver = Arc::new(VerifyingReceiver::default());
    receiver.statuses.lock().unwrap().extend([500, 502]);

    let relay = start_relay(feed, chain, receiver.clone(), FlushMode::Immediate);
    let depth: BufferDepth = relay.handle.depth();

    for (seq, symbol) in ["A", "B", "C"].iter().enumerate() {
        let frame = json!({
            "type": "prices",
            "data": [{"symbol": symbol, "price": "1.5", "seq": seq}],
        });
        conn.send(Ok(frame.to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let symbols: Vec<Vec<String>> = receiver
        .batches()
        .into_iter()
        .map(|b| b.into_iter().map(|u| u.symbol_or_round).collect())
        .collect();
    assert_eq!(symbols, vec![vec!["A"], vec!["A", "B"], vec!["A", "B", "C"]]);
    assert_eq!(depth.get(), 0);
}
