use std::sync::Arc;

use athwatch_models::{PipelineEvent, RecordStatus, RespondersConfig, Slot};
use athwatch_store::RecordStore;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::parse::address_candidates;
use crate::signals::ControlSignals;

static INSUFFICIENT_BALANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)insufficient balance").expect("balance pattern"));

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?\d+(?:\.\d+)?%").expect("percent pattern"));

const BUY_SUCCESS: &str = "Buy Success!";
const TRANSACTION_FAILED: &str = "Transaction Failed!";

/// What an execution responder's reply says about a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionReport {
    InsufficientBalance { address: Option<String> },
    Bought { address: String },
    Sold { address: String, result: Option<String> },
    Failed { address: String },
    Unrecognized,
}

/// Classify an execution reply.
///
/// Checks run in priority order: insufficient balance, buy success, sell,
/// transaction failure. A sell report is recognized by the executor's
/// referral `sell_marker` immediately followed by the asset address.
pub fn classify_execution(text: &str, sell_marker: Option<&str>) -> ExecutionReport {
    let address = address_candidates(text).next().map(str::to_string);

    if INSUFFICIENT_BALANCE.is_match(text) {
        return ExecutionReport::InsufficientBalance { address };
    }

    let Some(address) = address else {
        return ExecutionReport::Unrecognized;
    };

    if text.contains(BUY_SUCCESS) {
        return ExecutionReport::Bought { address };
    }

    if let Some(marker) = sell_marker {
        let needle = format!("{marker}{address}").to_lowercase();
        if text.to_lowercase().contains(&needle) {
            let result = PERCENT.find(text).map(|m| m.as_str().to_string());
            return ExecutionReport::Sold { address, result };
        }
    }

    if text.contains(TRANSACTION_FAILED) {
        return ExecutionReport::Failed { address };
    }

    ExecutionReport::Unrecognized
}

/// Applies execution replies to the record store and escalates critical
/// failures to a pipeline pause.
///
/// Runs regardless of the pause flag: these replies describe trades that are
/// already in flight.
#[derive(Clone)]
pub struct ExecutionHandler {
    store: Arc<dyn RecordStore>,
    signals: ControlSignals,
    responders: RespondersConfig,
}

impl ExecutionHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        signals: ControlSignals,
        responders: RespondersConfig,
    ) -> Self {
        Self {
            store,
            signals,
            responders,
        }
    }

    /// Classify and apply a reply from the executor in `slot`.
    pub async fn handle_reply(&self, slot: Slot, text: &str) -> ExecutionReport {
        let report = classify_execution(text, self.responders.sell_marker(slot));
        self.apply(slot, &report).await;
        report
    }

    async fn apply(&self, slot: Slot, report: &ExecutionReport) {
        match report {
            ExecutionReport::InsufficientBalance { address } => {
                error!(executor = %slot, address = ?address, "Executor reports insufficient balance");
                self.signals
                    .pause(&format!("insufficient balance reported by {slot} executor"));
            }
            ExecutionReport::Bought { address } => {
                self.update(address, RecordStatus::BuySuccess, None).await;
            }
            ExecutionReport::Sold { address, result } => {
                if result.is_none() {
                    warn!(%address, executor = %slot, "Sell report without a result percentage");
                }
                self.update(address, RecordStatus::SellSuccess, result.clone())
                    .await;
            }
            ExecutionReport::Failed { address } => {
                if self.update(address, RecordStatus::BuyFailed, None).await {
                    self.signals
                        .pause(&format!("transaction failed for {address} on {slot} executor"));
                }
            }
            ExecutionReport::Unrecognized => {
                debug!(executor = %slot, "Execution reply matched no known pattern");
            }
        }
    }

    /// Returns true when a known record was updated.
    async fn update(&self, address: &str, status: RecordStatus, result: Option<String>) -> bool {
        match self.store.update_status(address, status).await {
            Ok(true) => {
                info!(%address, %status, result = ?result, "Execution update recorded");
                self.signals.events().emit(PipelineEvent::ExecutionUpdate {
                    address: address.to_string(),
                    status,
                    result,
                });
                true
            }
            Ok(false) => {
                debug!(%address, %status, "Execution update for unknown asset ignored");
                false
            }
            Err(e) => {
                error!(%address, %status, error = %e, "Failed to record execution update");
                false
            }
        }
    }
}
