use std::sync::Arc;

use athwatch_models::{
    AssetRecord, Decision, DiscardReason, PipelineConfig, PipelineEvent, RecordStatus, Slot,
};
use athwatch_store::RecordStore;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::correlator::Correlator;
use crate::signals::ControlSignals;
use crate::transport::Transport;

/// What happened to one decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Discarded(DiscardReason),
    Forwarded { executor: Slot, persisted: bool },
    ForwardFailed { executor: Slot },
}

/// Drains the decision queue into the execution stage.
pub struct DecisionConsumer {
    correlator: Correlator,
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    signals: ControlSignals,
    config: Arc<PipelineConfig>,
}

impl DecisionConsumer {
    pub fn new(
        correlator: Correlator,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RecordStore>,
        signals: ControlSignals,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            correlator,
            transport,
            store,
            signals,
            config,
        }
    }

    /// Process decisions in arrival order until the queue closes or shutdown
    /// is requested.
    pub async fn run(self, mut decisions: mpsc::UnboundedReceiver<Decision>) {
        let cancel = self.signals.shutdown_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Decision consumer shutting down");
                    break;
                }
                next = decisions.recv() => {
                    let Some(decision) = next else {
                        tracing::info!("Decision queue closed");
                        break;
                    };
                    self.consume(decision).await;
                }
            }
        }
    }

    /// Re-validate, filter, route and forward one decision.
    ///
    /// Forwarding is best effort: a failed send leaves the asset unpersisted
    /// and is not retried.
    pub async fn consume(&self, decision: Decision) -> ConsumeOutcome {
        let outcome = self.process(&decision).await;
        // Consumed either way; the entry has nothing left to wait for.
        self.correlator.release(&decision);
        outcome
    }

    async fn process(&self, decision: &Decision) -> ConsumeOutcome {
        let address = decision.request_id.as_str();

        if self.signals.is_paused() {
            return self.discard(address, DiscardReason::Paused);
        }

        match self.store.get_status(address).await {
            Ok(Some(status)) if status.blocks_new_decision() => {
                return self.discard(address, DiscardReason::AlreadyTracked { status });
            }
            Ok(_) => {}
            Err(e) => {
                error!(%address, error = %e, "Record store unavailable, decision not processed");
                return self.discard(address, DiscardReason::StoreUnavailable);
            }
        }

        let ceiling = self.config.thresholds.max_ath_seconds;
        if decision.chosen_value > ceiling {
            return self.discard(
                address,
                DiscardReason::AboveCeiling {
                    value: decision.chosen_value,
                    ceiling,
                },
            );
        }

        let volume = decision.context.volume.unwrap_or(Decimal::ZERO);
        let executor = if volume < self.config.thresholds.volume_split {
            Slot::Primary
        } else {
            Slot::Secondary
        };
        let peer = self.config.responders.execution_peer(executor).to_string();
        let events = self.correlator.events();

        if !self.transport.send(&peer, address).await {
            warn!(%address, %executor, %peer, "Forward to executor failed, not persisted");
            events.emit(PipelineEvent::ForwardFailed {
                address: address.to_string(),
                peer,
            });
            return ConsumeOutcome::ForwardFailed { executor };
        }

        info!(
            %address,
            ticker = %decision.context.candidate.label(),
            seconds = decision.chosen_value,
            %volume,
            %executor,
            "Forwarded to executor"
        );
        events.emit(PipelineEvent::Forwarded {
            address: address.to_string(),
            executor,
            peer,
            volume,
        });

        let record = processing_record(decision);
        let persisted = match self.store.upsert(&record).await {
            Ok(()) => {
                events.emit(PipelineEvent::Persisted {
                    address: address.to_string(),
                    status: record.status,
                });
                true
            }
            Err(e) => {
                error!(%address, error = %e, "Failed to persist forwarded asset");
                false
            }
        };

        ConsumeOutcome::Forwarded {
            executor,
            persisted,
        }
    }

    fn discard(&self, address: &str, reason: DiscardReason) -> ConsumeOutcome {
        debug!(%address, ?reason, "Decision discarded");
        self.correlator
            .events()
            .emit(PipelineEvent::DecisionDiscarded {
                address: address.to_string(),
                reason: reason.clone(),
            });
        ConsumeOutcome::Discarded(reason)
    }
}

/// The row written when an asset is handed to an executor. `thread_ref` is
/// left empty so an existing reference survives the upsert.
fn processing_record(decision: &Decision) -> AssetRecord {
    let context = &decision.context;
    AssetRecord {
        address: decision.request_id.clone(),
        ticker: context.candidate.ticker.clone(),
        age: context.candidate.age.clone(),
        market_cap: context.market_cap,
        liquidity: context.liquidity,
        volume: context.volume,
        ath_seconds: Some(decision.chosen_value),
        status: RecordStatus::Processing,
        thread_ref: None,
        updated_at: String::new(),
    }
}
