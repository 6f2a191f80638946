use async_trait::async_trait;
use athwatch_models::Candidate;

use crate::error::EngineError;

/// Source of candidate assets, one batch per cycle.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self) -> Result<Vec<Candidate>, EngineError>;
}

/// Parse a scraper's JSON output: either a bare array of candidates or an
/// object with a `candidates` array.
pub fn candidates_from_json(json: &str) -> Result<Vec<Candidate>, EngineError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("candidates")
            .ok_or_else(|| EngineError::Scrape("missing 'candidates' array".to_string()))?,
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}
