use std::collections::HashSet;
use std::sync::Arc;

use athwatch_models::{Candidate, PipelineConfig, PipelineEvent, RejectReason, RequestContext, Slot};
use tracing::{debug, info, warn};

use crate::correlator::{Correlator, DispatchState};
use crate::parse::{is_valid_address, parse_money, parse_relative_time};
use crate::signals::ControlSignals;
use crate::transport::Transport;

/// Tally of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// True when the cycle never started because the pipeline was paused or
    /// shutting down.
    pub skipped: bool,
    pub dispatched: usize,
    pub rejected: usize,
    /// Candidates no verification responder could be reached for.
    pub unreachable: usize,
    /// The cycle stopped early on pause or shutdown.
    pub interrupted: bool,
}

/// Sends each cycle's candidates to the verification responders and seeds
/// the correlation table.
pub struct Dispatcher {
    correlator: Correlator,
    transport: Arc<dyn Transport>,
    signals: ControlSignals,
    config: Arc<PipelineConfig>,
}

impl Dispatcher {
    pub fn new(
        correlator: Correlator,
        transport: Arc<dyn Transport>,
        signals: ControlSignals,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            correlator,
            transport,
            signals,
            config,
        }
    }

    /// Run one request cycle over a freshly scraped batch.
    ///
    /// Sends are strictly sequential with `send_delay` between them. A send in
    /// progress is never cancelled; shutdown is observed during the pacing
    /// wait instead.
    pub async fn dispatch_cycle(&self, candidates: Vec<Candidate>) -> DispatchReport {
        let mut report = DispatchReport::default();
        if self.signals.is_shutdown() || self.signals.is_paused() {
            debug!("Pipeline paused or stopping, cycle skipped");
            report.skipped = true;
            return report;
        }

        self.correlator.begin_cycle();
        let events = self.correlator.events();
        events.emit(PipelineEvent::CycleStarted {
            candidates: candidates.len(),
        });
        info!(candidates = candidates.len(), "Dispatch cycle started");

        let slots = self.config.active_verification_slots();
        let mut seen: HashSet<String> = HashSet::new();

        for candidate in candidates {
            if self.signals.is_shutdown() || self.signals.is_paused() {
                report.interrupted = true;
                break;
            }

            let context = match self.admit(&candidate, &mut seen) {
                Ok(context) => context,
                Err(reason) => {
                    debug!(address = %candidate.address, ticker = %candidate.label(), ?reason, "Candidate rejected");
                    events.emit(PipelineEvent::CandidateRejected {
                        address: candidate.address.clone(),
                        reason,
                    });
                    report.rejected += 1;
                    continue;
                }
            };

            let address = candidate.address.clone();
            if !self.correlator.seed(context, &slots) {
                // Only possible if an entry survived begin_cycle; treat as duplicate.
                events.emit(PipelineEvent::CandidateRejected {
                    address,
                    reason: RejectReason::Duplicate,
                });
                report.rejected += 1;
                continue;
            }

            let (reached, stopped) = self.send_to_verifiers(&address, &slots).await;

            match self.correlator.finish_dispatch(&address) {
                DispatchState::Awaiting | DispatchState::Settled => {
                    info!(%address, ticker = %candidate.label(), responders = ?reached, "Dispatched");
                    events.emit(PipelineEvent::Dispatched {
                        address,
                        responders: reached,
                    });
                    report.dispatched += 1;
                }
                DispatchState::Unreachable => {
                    warn!(%address, "No verification responder reachable, request discarded");
                    events.emit(PipelineEvent::DispatchFailed { address });
                    report.unreachable += 1;
                }
            }

            if stopped {
                report.interrupted = true;
                break;
            }
        }

        info!(
            dispatched = report.dispatched,
            rejected = report.rejected,
            unreachable = report.unreachable,
            "Dispatch cycle finished"
        );
        report
    }

    /// Filter a candidate and build its request context.
    fn admit(
        &self,
        candidate: &Candidate,
        seen: &mut HashSet<String>,
    ) -> Result<RequestContext, RejectReason> {
        if !is_valid_address(&candidate.address) {
            return Err(RejectReason::InvalidAddress);
        }
        if !seen.insert(candidate.address.clone()) {
            return Err(RejectReason::Duplicate);
        }

        let age_seconds = parse_relative_time(&candidate.age).ok_or_else(|| RejectReason::UnknownAge {
            age: candidate.age.clone(),
        })?;
        let floor_seconds = self.config.thresholds.min_age_seconds;
        if age_seconds <= floor_seconds {
            return Err(RejectReason::TooNew {
                age_seconds,
                floor_seconds,
            });
        }

        Ok(RequestContext {
            candidate: candidate.clone(),
            age_seconds,
            market_cap: parse_money(&candidate.market_cap),
            liquidity: parse_money(&candidate.liquidity),
            volume: parse_money(&candidate.volume),
        })
    }

    /// Send `address` to each slot in order. Returns the slots reached and
    /// whether shutdown interrupted the pacing.
    async fn send_to_verifiers(&self, address: &str, slots: &[Slot]) -> (Vec<Slot>, bool) {
        let mut reached = Vec::with_capacity(slots.len());
        for slot in slots {
            // A fast reply may already have decided the request.
            if !self.correlator.is_live(address) {
                break;
            }
            let Some(peer) = self.config.responders.verification_peer(*slot) else {
                continue;
            };

            if self.transport.send(peer, address).await {
                self.correlator.mark_pending(address, *slot);
                reached.push(*slot);
            } else {
                warn!(%address, responder = %slot, %peer, "Send to verification responder failed");
            }

            if !self.pace().await {
                return (reached, true);
            }
        }
        (reached, false)
    }

    /// Wait out the inter-send delay. False if shutdown arrived meanwhile.
    async fn pace(&self) -> bool {
        let cancel = self.signals.shutdown_token();
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.timing.send_delay()) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::table::ResponderState;
    use crate::test_support::RecordingTransport;
    use athwatch_models::{RespondersConfig, VerificationMode};
    use tokio::time::{Duration, Instant};

    const CA1: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
    const CA2: &str = "SysvarRent111111111111111111111111111111111";

    fn config(mode: VerificationMode) -> PipelineConfig {
        PipelineConfig {
            responders: RespondersConfig {
                verification_primary: Some("@probe".to_string()),
                verification_secondary: Some("@scan".to_string()),
                execution_primary: "@fast".to_string(),
                execution_secondary: "@bulk".to_string(),
                ..RespondersConfig::default()
            },
            thresholds: Default::default(),
            timing: Default::default(),
            verification_mode: mode,
            decision_policy: Default::default(),
        }
    }

    fn candidate(address: &str, age: &str) -> Candidate {
        Candidate {
            address: address.to_string(),
            ticker: "T".to_string(),
            age: age.to_string(),
            market_cap: "$200K".to_string(),
            liquidity: "$30K".to_string(),
            volume: "$95K".to_string(),
        }
    }

    fn setup(
        mode: VerificationMode,
        transport: Arc<RecordingTransport>,
    ) -> (Dispatcher, Correlator, ControlSignals) {
        let config = Arc::new(config(mode));
        let events = EventBus::default();
        let signals = ControlSignals::new(events.clone());
        let (correlator, _rx) = Correlator::with_queue(&config, events);
        let dispatcher = Dispatcher::new(correlator.clone(), transport, signals.clone(), config);
        (dispatcher, correlator, signals)
    }

    #[tokio::test(start_paused = true)]
    async fn filters_and_dispatches_with_pacing() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, correlator, _signals) = setup(VerificationMode::Both, transport.clone());

        let start = Instant::now();
        let report = dispatcher
            .dispatch_cycle(vec![
                candidate(CA1, "12m"),
                candidate("not-an-address", "12m"),
                candidate(CA2, "8m"),
                candidate(CA1, "30m"),
                candidate(CA2, "soon"),
            ])
            .await;

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.rejected, 4);
        assert_eq!(
            transport.sent(),
            vec![("@probe".to_string(), CA1.to_string()), ("@scan".to_string(), CA1.to_string())]
        );
        // Two sends, each followed by the 1.1 s pacing delay.
        assert!(start.elapsed() >= Duration::from_millis(2_200));

        let entry = correlator.entry(CA1).unwrap();
        assert_eq!(entry.state(Slot::Primary), Some(ResponderState::Pending));
        assert_eq!(entry.state(Slot::Secondary), Some(ResponderState::Pending));
        assert_eq!(entry.context.age_seconds, 720);
        assert!(entry.dispatched);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_keeps_reachable_slot() {
        let transport = Arc::new(RecordingTransport::failing_for(&["@probe"]));
        let (dispatcher, correlator, _signals) = setup(VerificationMode::Both, transport.clone());

        let report = dispatcher.dispatch_cycle(vec![candidate(CA1, "12m")]).await;
        assert_eq!(report.dispatched, 1);

        let entry = correlator.entry(CA1).unwrap();
        assert_eq!(entry.state(Slot::Primary), Some(ResponderState::NotSent));
        assert_eq!(entry.state(Slot::Secondary), Some(ResponderState::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_request_is_discarded() {
        let transport = Arc::new(RecordingTransport::failing_for(&["@probe"]));
        let (dispatcher, correlator, _signals) = setup(VerificationMode::Primary, transport);

        let report = dispatcher.dispatch_cycle(vec![candidate(CA1, "12m")]).await;
        assert_eq!(report.unreachable, 1);
        assert!(correlator.entry(CA1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_pipeline_skips_cycle() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, correlator, signals) = setup(VerificationMode::Both, transport.clone());

        signals.pause("test");
        let report = dispatcher.dispatch_cycle(vec![candidate(CA1, "12m")]).await;
        assert!(report.skipped);
        assert!(transport.sent().is_empty());
        assert!(correlator.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_cycle_clears_previous_entries() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, correlator, _signals) = setup(VerificationMode::Primary, transport);

        dispatcher.dispatch_cycle(vec![candidate(CA1, "12m")]).await;
        dispatcher.dispatch_cycle(vec![candidate(CA2, "12m")]).await;
        assert!(correlator.entry(CA1).is_none());
        assert!(correlator.is_live(CA2));
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_pacing_stops_cycle() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _correlator, signals) = setup(VerificationMode::Primary, transport.clone());

        let stopper = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            stopper.shutdown();
        });

        let report = dispatcher
            .dispatch_cycle(vec![candidate(CA1, "12m"), candidate(CA2, "12m")])
            .await;
        assert!(report.interrupted);
        assert_eq!(report.dispatched, 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_between_paced_sends_counts_as_dispatched() {
        let config = Arc::new(config(VerificationMode::Both));
        let events = EventBus::default();
        let mut event_rx = events.subscribe();
        let signals = ControlSignals::new(events.clone());
        let (correlator, mut decisions) = Correlator::with_queue(&config, events);
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher =
            Dispatcher::new(correlator.clone(), transport.clone(), signals, config);

        // Primary answers inside the first pacing wait and the decision is
        // consumed before the second send.
        let replier = correlator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            replier.on_verification_reply(Slot::Primary, &format!("{CA1} ATH: $1M (15s ago)"));
            let decision = decisions.recv().await.unwrap();
            assert!(replier.release(&decision));
        });

        let report = dispatcher.dispatch_cycle(vec![candidate(CA1, "12m")]).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.unreachable, 0);
        assert_eq!(transport.sent_to("@scan"), Vec::<String>::new());
        assert!(correlator.is_empty());

        let events: Vec<PipelineEvent> = std::iter::from_fn(|| event_rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Decided { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Dispatched { responders, .. } if responders == &vec![Slot::Primary])));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::DispatchFailed { .. })));
    }
}
