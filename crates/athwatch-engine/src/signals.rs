use std::sync::Arc;

use athwatch_models::PipelineEvent;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::events::EventBus;

/// The two global signals every task observes: a resumable pause and a
/// one-way shutdown.
#[derive(Clone)]
pub struct ControlSignals {
    paused: Arc<watch::Sender<bool>>,
    shutdown: CancellationToken,
    events: EventBus,
}

impl ControlSignals {
    pub fn new(events: EventBus) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            shutdown: CancellationToken::new(),
            events,
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver that wakes on every pause/resume transition.
    pub fn watch_pause(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Halt new work until [`resume`](Self::resume). Returns false if the
    /// pipeline was already paused.
    pub fn pause(&self, reason: &str) -> bool {
        let changed = self.paused.send_if_modified(|paused| {
            let was = *paused;
            *paused = true;
            !was
        });
        if changed {
            error!(%reason, "Pipeline paused");
            self.events.emit(PipelineEvent::Paused {
                reason: reason.to_string(),
            });
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.paused.send_if_modified(|paused| {
            let was = *paused;
            *paused = false;
            was
        });
        if changed {
            info!("Pipeline resumed");
            self.events.emit(PipelineEvent::Resumed);
        }
        changed
    }

    /// Request an orderly stop. Also lifts any pause so tasks waiting on it
    /// see the shutdown.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutdown requested");
        self.shutdown.cancel();
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false));
        self.events.emit(PipelineEvent::ShutdownRequested);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
