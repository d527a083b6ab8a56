//! Run command implementation

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dedup::DedupFilter;
use crate::delivery::{DeliveryEngine, HttpTransport};
use crate::engine::{Engine, EngineHandle};
use crate::normalize::Normalizer;
use crate::poll::PollSource;
use crate::rollup::FlushMode;
use crate::source::{JsonRpcLogSource, WebSocketSource};
use crate::ws::{ConnectionSupervisor, SupervisorConfig};
use clap::Args;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Post every admitted update, ignoring the configured rollup window
    #[arg(long)]
    pub immediate: bool,

    /// Run without the log poller even if one is configured
    #[arg(long)]
    pub no_poll: bool,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if self.immediate {
            config.webhook.rollup_window_secs = 0;
        }
        if self.no_poll {
            config.poll = None;
        }
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport = Arc::new(HttpTransport::new(config.webhook.timeout())?);
        let delivery = Arc::new(DeliveryEngine::new(
            config.webhook.url.clone(),
            config.webhook.secret.clone(),
            transport,
            clock.clone(),
        ));
        if !delivery.is_signing() {
            tracing::warn!("No webhook secret configured, posting unsigned");
        }

        let kinds = config.event_kinds();
        if kinds.is_empty() {
            tracing::warn!("No event kinds configured, pushed log notifications will be ignored");
        }
        let normalizer = Normalizer::new(config.push.source_id.clone(), kinds.clone(), clock)
            .with_filter(config.push.filter());
        let (engine, handle) = Engine::new(
            normalizer,
            DedupFilter::new(config.dedup.seen_cap),
            FlushMode::from_window_secs(config.webhook.rollup_window_secs),
            delivery,
        );
        let engine_task = tokio::spawn(engine.run());

        let push = WebSocketSource::new(config.push.url.clone(), config.push.effective_origin())
            .with_subscribe_message(config.push.subscribe_message.clone());
        tracing::info!(url = %push.url(), origin = %push.origin(), "Push feed configured");
        let supervisor = ConnectionSupervisor::new(
            Arc::new(push),
            SupervisorConfig::default()
                .reconnect_delay(config.push.reconnect_delay())
                .heartbeat_interval(config.push.heartbeat_interval()),
            handle.sender(),
            handle.depth(),
        );
        let supervisor_task = tokio::spawn(supervisor.run());

        let poll_task = match &config.poll {
            Some(poll) => {
                let source = Arc::new(JsonRpcLogSource::new(poll.rpc_url.clone())?);
                let poller = PollSource::new(
                    source,
                    kinds,
                    poll.interval(),
                    poll.safety_margin,
                    handle.sender(),
                );
                Some(tokio::spawn(poller.run()))
            }
            None => {
                tracing::info!("Log poller disabled");
                None
            }
        };

        shutdown_signal().await?;

        supervisor_task.abort();
        if let Some(task) = poll_task {
            task.abort();
        }
        stop_engine(&handle).await;
        engine_task.await?;

        Ok(())
    }
}

/// Flush what is buffered and wait for the engine to stop
async fn stop_engine(handle: &EngineHandle) {
    tracing::info!(buffered = handle.depth().get(), "Flushing before exit");
    match handle.shutdown().await {
        Some(report) if report.undelivered > 0 => {
            tracing::warn!(
                delivered = report.delivered,
                undelivered = report.undelivered,
                "Exiting with undelivered updates"
            );
        }
        Some(report) => tracing::info!(delivered = report.delivered, "Final flush complete"),
        None => tracing::warn!("Engine had already stopped"),
    }
}

/// Completes when SIGTERM or SIGINT is received
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}
