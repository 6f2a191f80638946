use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of an asset once it has been handed to an executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    #[serde(rename = "Processing")]
    Processing,
    #[serde(rename = "Buy Success!")]
    BuySuccess,
    #[serde(rename = "Sell Success!")]
    SellSuccess,
    #[serde(rename = "Buy Failed")]
    BuyFailed,
}

impl RecordStatus {
    /// The literal stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Processing => "Processing",
            RecordStatus::BuySuccess => "Buy Success!",
            RecordStatus::SellSuccess => "Sell Success!",
            RecordStatus::BuyFailed => "Buy Failed",
        }
    }

    /// In progress or completed: a fresh decision for the same asset must not
    /// be processed again.
    pub fn blocks_new_decision(&self) -> bool {
        !matches!(self, RecordStatus::BuyFailed)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(RecordStatus::Processing),
            "Buy Success!" => Ok(RecordStatus::BuySuccess),
            "Sell Success!" => Ok(RecordStatus::SellSuccess),
            "Buy Failed" => Ok(RecordStatus::BuyFailed),
            other => Err(format!("unknown record status: {other}")),
        }
    }
}

/// The SQLite schema of the record store.
///
/// Amounts are stored as decimal text so they round-trip exactly.
pub const RECORDS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS asset_records (
    address      TEXT PRIMARY KEY,
    ticker       TEXT NOT NULL,
    age          TEXT NOT NULL,
    market_cap   TEXT,
    liquidity    TEXT,
    volume       TEXT,
    ath_seconds  INTEGER,
    status       TEXT NOT NULL,
    thread_ref   INTEGER,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_status ON asset_records(status);
";

/// One persisted asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    pub address: String,
    pub ticker: String,
    pub age: String,
    pub market_cap: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub ath_seconds: Option<u64>,
    pub status: RecordStatus,
    /// Reply-thread reference of the announcement for this asset. Survives
    /// later partial updates that carry no reference.
    pub thread_ref: Option<i64>,
    pub updated_at: String,
}
