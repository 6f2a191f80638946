use std::collections::HashMap;

use async_trait::async_trait;
use athwatch_models::{PipelineConfig, Slot};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One text event from the chat relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// Outbound side of the chat relay. Mockable for testing.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to `peer`. A failed delivery is reported as `false`,
    /// never as an error.
    async fn send(&self, peer: &str, text: &str) -> bool;
}

/// Canonical form of a chat identity: no leading `@`, lowercase.
pub fn normalize_peer(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

/// Role a known sender plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Verification(Slot),
    Execution(Slot),
}

/// Maps normalized sender names to their [`Route`].
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    routes: HashMap<String, Route>,
}

impl PeerDirectory {
    /// Verification peers of the active mode plus both executors.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut directory = Self::default();
        for slot in config.active_verification_slots() {
            if let Some(peer) = config.responders.verification_peer(slot) {
                directory.insert(peer, Route::Verification(slot));
            }
        }
        for slot in Slot::ALL {
            directory.insert(config.responders.execution_peer(slot), Route::Execution(slot));
        }
        directory
    }

    pub fn insert(&mut self, peer: &str, route: Route) {
        let key = normalize_peer(peer);
        if key.is_empty() {
            return;
        }
        if let Some(previous) = self.routes.insert(key, route) {
            warn!(%peer, ?previous, ?route, "Peer configured for two roles, keeping the last");
        }
    }

    /// Route for `sender`, or None for anyone not configured.
    pub fn route(&self, sender: &str) -> Option<Route> {
        self.routes.get(&normalize_peer(sender)).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
