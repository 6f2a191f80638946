pub mod classify;
pub mod consumer;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod execution;
pub mod monitor;
pub mod parse;
pub mod pipeline;
pub mod router;
pub mod scraper;
pub mod signals;
pub mod table;
pub mod transport;

pub mod test_support;

pub use classify::{classify_verification, Verdict};
pub use consumer::{ConsumeOutcome, DecisionConsumer};
pub use correlator::{Correlator, DispatchState};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::EngineError;
pub use evaluator::{evaluate, Evaluation};
pub use events::EventBus;
pub use execution::{classify_execution, ExecutionHandler, ExecutionReport};
pub use monitor::timeout_monitor;
pub use pipeline::{run_cycle, Pipeline};
pub use router::{InboundRouter, Routed};
pub use scraper::{candidates_from_json, PageScraper};
pub use signals::ControlSignals;
pub use table::{CorrelationEntry, CorrelationTable, ResponderState};
pub use transport::{normalize_peer, InboundMessage, PeerDirectory, Route, Transport};
