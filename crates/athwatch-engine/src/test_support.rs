//! Test doubles for the pipeline's external collaborators.
//!
//! `RecordingTransport` captures every send instead of talking to a chat
//! relay, `StaticScraper` replays canned batches and `UnavailableStore`
//! fails every call the way a locked or missing database would.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use athwatch_models::{AssetRecord, Candidate, RecordStatus};
use athwatch_store::{RecordStore, StoreError};

use crate::error::EngineError;
use crate::scraper::PageScraper;
use crate::transport::{normalize_peer, Transport};

/// Transport that records `(peer, text)` pairs. Sends to peers listed as
/// failing return false and are not recorded.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(peers: &[&str]) -> Self {
        let transport = Self::new();
        for peer in peers {
            transport.set_failing(peer, true);
        }
        transport
    }

    pub fn set_failing(&self, peer: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(normalize_peer(peer));
        } else {
            set.remove(&normalize_peer(peer));
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts delivered to `peer`, in order.
    pub fn sent_to(&self, peer: &str) -> Vec<String> {
        let key = normalize_peer(peer);
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| normalize_peer(p) == key)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, peer: &str, text: &str) -> bool {
        if self.failing.lock().unwrap().contains(&normalize_peer(peer)) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .push((peer.to_string(), text.to_string()));
        true
    }
}

/// Scraper that hands out queued batches, then the fallback batch forever.
pub struct StaticScraper {
    queued: Mutex<VecDeque<Result<Vec<Candidate>, String>>>,
    fallback: Vec<Candidate>,
}

impl StaticScraper {
    pub fn new(fallback: Vec<Candidate>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn push_batch(&self, batch: Vec<Candidate>) {
        self.queued.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_failure(&self, message: &str) {
        self.queued
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl PageScraper for StaticScraper {
    async fn scrape(&self) -> Result<Vec<Candidate>, EngineError> {
        match self.queued.lock().unwrap().pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(EngineError::Scrape(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Record store whose every call fails.
pub struct UnavailableStore;

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn upsert(&self, _record: &AssetRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("test store is down".to_string()))
    }

    async fn get_status(&self, _address: &str) -> Result<Option<RecordStatus>, StoreError> {
        Err(StoreError::Unavailable("test store is down".to_string()))
    }

    async fn get_record(&self, _address: &str) -> Result<Option<AssetRecord>, StoreError> {
        Err(StoreError::Unavailable("test store is down".to_string()))
    }

    async fn update_status(
        &self,
        _address: &str,
        _status: RecordStatus,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("test store is down".to_string()))
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("test store is down".to_string()))
    }
}
