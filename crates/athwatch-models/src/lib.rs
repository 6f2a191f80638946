pub mod candidate;
pub mod config;
pub mod decision;
pub mod event;
pub mod record;
pub mod responder;

pub use candidate::{Candidate, RequestContext};
pub use config::{PipelineConfig, RespondersConfig, ThresholdsConfig, TimingConfig};
pub use decision::Decision;
pub use event::{DiscardReason, PipelineEvent, RejectReason};
pub use record::{AssetRecord, RecordStatus, RECORDS_TABLE_DDL};
pub use responder::{DecisionPolicy, Slot, VerificationMode};
