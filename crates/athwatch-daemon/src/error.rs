use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] athwatch_store::StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] athwatch_engine::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
