use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::record::RecordStatus;
use crate::responder::Slot;

/// Why the dispatcher refused a scraped candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RejectReason {
    InvalidAddress,
    UnknownAge { age: String },
    TooNew { age_seconds: u64, floor_seconds: u64 },
    Duplicate,
}

/// Why the consumer threw away a decision instead of forwarding it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DiscardReason {
    Paused,
    AlreadyTracked { status: RecordStatus },
    AboveCeiling { value: u64, ceiling: u64 },
    StoreUnavailable,
}

/// Every observable step of the pipeline. Broadcast to subscribers so that
/// decisions, drops and escalations can be asserted on or announced without
/// scraping log lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PipelineEvent {
    CycleStarted {
        candidates: usize,
    },
    CandidateRejected {
        address: String,
        reason: RejectReason,
    },
    Dispatched {
        address: String,
        responders: Vec<Slot>,
    },
    /// No verification responder could be reached.
    DispatchFailed {
        address: String,
    },
    Decided {
        decision: Decision,
    },
    /// Every responder settled without a usable value.
    Dropped {
        address: String,
    },
    DecisionDiscarded {
        address: String,
        reason: DiscardReason,
    },
    Forwarded {
        address: String,
        executor: Slot,
        peer: String,
        volume: Decimal,
    },
    ForwardFailed {
        address: String,
        peer: String,
    },
    Persisted {
        address: String,
        status: RecordStatus,
    },
    ExecutionUpdate {
        address: String,
        status: RecordStatus,
        result: Option<String>,
    },
    Paused {
        reason: String,
    },
    Resumed,
    ShutdownRequested,
}
