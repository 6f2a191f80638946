use std::sync::Arc;
use std::time::Instant;

use athwatch_models::{Decision, PipelineConfig};
use athwatch_store::RecordStore;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::consumer::DecisionConsumer;
use crate::correlator::Correlator;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::EngineError;
use crate::events::EventBus;
use crate::execution::ExecutionHandler;
use crate::router::InboundRouter;
use crate::scraper::PageScraper;
use crate::signals::ControlSignals;
use crate::transport::{PeerDirectory, Transport};

/// Every engine component wired to one transport, one store and one set of
/// control signals.
///
/// The long-running parts (`router`, `consumer` with its `decisions`
/// receiver, and the timeout monitor over `correlator`) are meant to be
/// moved into their own tasks.
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    pub events: EventBus,
    pub signals: ControlSignals,
    pub correlator: Correlator,
    pub dispatcher: Dispatcher,
    pub router: InboundRouter,
    pub consumer: DecisionConsumer,
    pub decisions: mpsc::UnboundedReceiver<Decision>,
}

impl Pipeline {
    /// Validate `config` and assemble the pipeline.
    pub fn build(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let config = Arc::new(config);

        let events = EventBus::default();
        let signals = ControlSignals::new(events.clone());
        let (correlator, decisions) = Correlator::with_queue(&config, events.clone());

        let dispatcher = Dispatcher::new(
            correlator.clone(),
            Arc::clone(&transport),
            signals.clone(),
            Arc::clone(&config),
        );
        let execution = ExecutionHandler::new(
            Arc::clone(&store),
            signals.clone(),
            config.responders.clone(),
        );
        let router = InboundRouter::new(
            PeerDirectory::from_config(&config),
            correlator.clone(),
            execution,
            signals.clone(),
        );
        let consumer = DecisionConsumer::new(
            correlator.clone(),
            transport,
            store,
            signals.clone(),
            Arc::clone(&config),
        );

        info!(
            mode = ?config.verification_mode,
            policy = ?config.decision_policy,
            responders = ?config.active_verification_slots(),
            "Pipeline assembled"
        );

        Ok(Self {
            config,
            events,
            signals,
            correlator,
            dispatcher,
            router,
            consumer,
            decisions,
        })
    }
}

/// Scrape one batch and dispatch it. A failed scrape skips the cycle and
/// returns None.
pub async fn run_cycle(scraper: &dyn PageScraper, dispatcher: &Dispatcher) -> Option<DispatchReport> {
    let start = Instant::now();
    let candidates = match scraper.scrape().await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "Scrape failed, cycle skipped");
            return None;
        }
    };
    let report = dispatcher.dispatch_cycle(candidates).await;
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        dispatched = report.dispatched,
        "Cycle complete"
    );
    Some(report)
}
