use std::path::PathBuf;

use async_trait::async_trait;
use athwatch_engine::{candidates_from_json, EngineError, PageScraper};
use athwatch_models::Candidate;

/// Reads the candidate list an external browser scraper leaves on disk.
///
/// The file is re-read on every cycle; a missing or half-written file fails
/// the scrape and the cycle is skipped.
pub struct SnapshotScraper {
    path: PathBuf,
}

impl SnapshotScraper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PageScraper for SnapshotScraper {
    async fn scrape(&self) -> Result<Vec<Candidate>, EngineError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::Scrape(format!("{}: {e}", self.path.display())))?;
        let candidates = candidates_from_json(&text)?;
        tracing::debug!(count = candidates.len(), path = %self.path.display(), "Snapshot read");
        Ok(candidates)
    }
}
