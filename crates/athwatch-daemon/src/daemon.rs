use std::sync::Arc;
use std::time::Duration;

use athwatch_engine::{
    timeout_monitor, ControlSignals, InboundMessage, PageScraper, Pipeline, Transport,
};
use athwatch_models::PipelineEvent;
use athwatch_store::{CachedRecordStore, SqliteStore};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::{DaemonConfig, StoreConfig};
use crate::error::DaemonError;
use crate::schedule::scrape_scheduler;

/// Open the SQLite record database behind a hot cache.
pub fn open_store(config: &StoreConfig) -> Result<CachedRecordStore, DaemonError> {
    if let Some(parent) = std::path::Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let sqlite = SqliteStore::open(&config.sqlite_path)?;
    Ok(CachedRecordStore::new(
        sqlite,
        config.hot_cache_capacity,
        Duration::from_secs(config.hot_cache_ttl_seconds),
    ))
}

/// The pipeline daemon. Owns the assembled pipeline and runs its
/// long-lived tasks until shutdown.
pub struct Daemon {
    pipeline: Pipeline,
    scraper: Arc<dyn PageScraper>,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        store: Arc<CachedRecordStore>,
        transport: Arc<dyn Transport>,
        scraper: Arc<dyn PageScraper>,
    ) -> Result<Self, DaemonError> {
        let pipeline = Pipeline::build(config.pipeline, transport, store)?;
        Ok(Self { pipeline, scraper })
    }

    /// Handle for pausing, resuming and stopping the running daemon.
    pub fn signals(&self) -> ControlSignals {
        self.pipeline.signals.clone()
    }

    /// Run every pipeline task until shutdown. `inbound` carries chat
    /// messages from the transport.
    pub async fn run(self, inbound: mpsc::Receiver<InboundMessage>) -> Result<(), DaemonError> {
        tracing::info!("athwatch daemon starting");

        let Pipeline {
            config,
            events,
            signals,
            correlator,
            dispatcher,
            router,
            consumer,
            decisions,
        } = self.pipeline;

        let mut join_set = tokio::task::JoinSet::new();

        // Task 1: scrape + dispatch once a minute
        {
            let scraper = self.scraper.clone();
            let signals = signals.clone();
            let second = config.timing.scrape_second;
            join_set.spawn(async move {
                scrape_scheduler(scraper, dispatcher, signals, second).await;
            });
        }

        // Task 2: inbound chat messages
        join_set.spawn(router.run(inbound));

        // Task 3: responder timeouts
        join_set.spawn(timeout_monitor(
            correlator,
            signals.clone(),
            config.timing.sweep_interval(),
        ));

        // Task 4: decisions to executors
        join_set.spawn(consumer.run(decisions));

        // Task 5: pipeline event log
        {
            let rx = events.subscribe();
            let cancel = signals.shutdown_token();
            join_set.spawn(async move {
                event_logger(rx, cancel).await;
            });
        }

        tracing::info!(
            scrape_second = config.timing.scrape_second,
            "All pipeline tasks started"
        );

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Pipeline task failed");
                signals.shutdown();
            }
        }

        tracing::info!("athwatch daemon stopped");
        Ok(())
    }
}

/// Write every pipeline event to the log as one JSON field.
async fn event_logger(mut rx: broadcast::Receiver<PipelineEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Event logger shutting down");
                break;
            }
            received = rx.recv() => match received {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn log_event(event: &PipelineEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Unserializable pipeline event");
            return;
        }
    };
    match event {
        PipelineEvent::Paused { .. } | PipelineEvent::ForwardFailed { .. } => {
            tracing::warn!(event = %json, "pipeline event");
        }
        PipelineEvent::CandidateRejected { .. } | PipelineEvent::DecisionDiscarded { .. } => {
            tracing::debug!(event = %json, "pipeline event");
        }
        _ => tracing::info!(event = %json, "pipeline event"),
    }
}
