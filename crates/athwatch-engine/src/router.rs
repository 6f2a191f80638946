use tokio::sync::mpsc;
use tracing::debug;

use crate::classify::Verdict;
use crate::correlator::Correlator;
use crate::execution::{ExecutionHandler, ExecutionReport};
use crate::signals::ControlSignals;
use crate::transport::{InboundMessage, PeerDirectory, Route};

/// What the router did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Sender is not a configured responder.
    UnknownSender,
    /// Verification reply that arrived while paused.
    PausedDrop,
    Verification(Verdict),
    Execution(ExecutionReport),
}

/// Fans inbound chat messages out to the verification correlator or the
/// execution handler according to who sent them.
pub struct InboundRouter {
    directory: PeerDirectory,
    correlator: Correlator,
    execution: ExecutionHandler,
    signals: ControlSignals,
}

impl InboundRouter {
    pub fn new(
        directory: PeerDirectory,
        correlator: Correlator,
        execution: ExecutionHandler,
        signals: ControlSignals,
    ) -> Self {
        Self {
            directory,
            correlator,
            execution,
            signals,
        }
    }

    pub async fn route(&self, message: &InboundMessage) -> Routed {
        match self.directory.route(&message.sender) {
            None => {
                debug!(sender = %message.sender, "Message from unknown sender ignored");
                Routed::UnknownSender
            }
            Some(Route::Verification(slot)) => {
                if self.signals.is_paused() {
                    debug!(responder = %slot, "Paused, verification reply dropped");
                    return Routed::PausedDrop;
                }
                Routed::Verification(self.correlator.on_verification_reply(slot, &message.text))
            }
            Some(Route::Execution(slot)) => {
                Routed::Execution(self.execution.handle_reply(slot, &message.text).await)
            }
        }
    }

    /// Route messages until the inbound stream ends or shutdown is requested.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let cancel = self.signals.shutdown_token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Inbound router shutting down");
                    break;
                }
                next = inbound.recv() => {
                    let Some(message) = next else {
                        tracing::info!("Inbound stream closed");
                        break;
                    };
                    self.route(&message).await;
                }
            }
        }
    }
}
