use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::RequestContext;
use crate::responder::Slot;

/// The single final outcome of racing the verification responders for one
/// request. Emitted at most once per request identifier per cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    /// Asset address the request was keyed by.
    pub request_id: String,
    /// Seconds since the asset's all-time high, as reported by `source`.
    pub chosen_value: u64,
    pub source: Slot,
    pub context: RequestContext,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(chosen_value: u64, source: Slot, context: RequestContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: context.candidate.address.clone(),
            chosen_value,
            source,
            context,
            decided_at: Utc::now(),
        }
    }
}
