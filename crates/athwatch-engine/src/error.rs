use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Scrape failed: {0}")]
    Scrape(String),

    #[error("Store error: {0}")]
    Store(#[from] athwatch_store::StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
