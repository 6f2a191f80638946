use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record {address}: {reason}")]
    Corrupt { address: String, reason: String },

    #[error("Store not available: {0}")]
    Unavailable(String),
}
