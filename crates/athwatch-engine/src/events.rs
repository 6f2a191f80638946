use athwatch_models::PipelineEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out of [`PipelineEvent`]s to any number of observers.
///
/// Emitting never fails: with nobody subscribed the event is simply lost.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PipelineEvent) {
        trace!(?event, "Pipeline event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
