use std::str::FromStr;

use athwatch_models::record::{AssetRecord, RecordStatus, RECORDS_TABLE_DDL};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::StoreError;

const SELECT_COLUMNS: &str = "SELECT address, ticker, age, market_cap, liquidity, volume, \
     ath_seconds, status, thread_ref, updated_at FROM asset_records";

/// SQLite-backed record store.
///
/// Opened read-write in WAL mode. Every write stamps `updated_at`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the record database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(RECORDS_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema applied. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RECORDS_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Insert or overwrite a record.
    ///
    /// `thread_ref` is the one exception to overwrite: a NULL in the new row
    /// keeps whatever reference was stored before.
    pub fn upsert(&self, record: &AssetRecord) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO asset_records \
             (address, ticker, age, market_cap, liquidity, volume, ath_seconds, status, thread_ref, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(address) DO UPDATE SET \
                ticker = excluded.ticker, \
                age = excluded.age, \
                market_cap = excluded.market_cap, \
                liquidity = excluded.liquidity, \
                volume = excluded.volume, \
                ath_seconds = excluded.ath_seconds, \
                status = excluded.status, \
                thread_ref = COALESCE(excluded.thread_ref, asset_records.thread_ref), \
                updated_at = excluded.updated_at",
            rusqlite::params![
                record.address,
                record.ticker,
                record.age,
                record.market_cap.map(|d| d.to_string()),
                record.liquidity.map(|d| d.to_string()),
                record.volume.map(|d| d.to_string()),
                record.ath_seconds.map(|s| s as i64),
                record.status.as_str(),
                record.thread_ref,
                now,
            ],
        )?;
        Ok(())
    }

    /// Status of a record, or None if the address was never persisted.
    pub fn get_status(&self, address: &str) -> Result<Option<RecordStatus>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT status FROM asset_records WHERE address = ?1")?;
        let raw: Option<String> = stmt
            .query_row(rusqlite::params![address], |row| row.get(0))
            .optional()?;

        raw.map(|s| {
            RecordStatus::from_str(&s).map_err(|reason| StoreError::Corrupt {
                address: address.to_string(),
                reason,
            })
        })
        .transpose()
    }

    pub fn get_record(&self, address: &str) -> Result<Option<AssetRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE address = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let raw = stmt
            .query_row(rusqlite::params![address], RawRecord::from_row)
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Set the status of an existing record. Returns false when the address
    /// is unknown.
    pub fn update_status(&self, address: &str, status: RecordStatus) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE asset_records SET status = ?1, updated_at = ?2 WHERE address = ?3",
            rusqlite::params![status.as_str(), now, address],
        )?;
        Ok(changed > 0)
    }

    /// Delete every record. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let deleted = self.conn.execute("DELETE FROM asset_records", [])?;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM asset_records", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Column values as SQLite hands them back, before decimal and status
/// parsing.
struct RawRecord {
    address: String,
    ticker: String,
    age: String,
    market_cap: Option<String>,
    liquidity: Option<String>,
    volume: Option<String>,
    ath_seconds: Option<i64>,
    status: String,
    thread_ref: Option<i64>,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            address: row.get(0)?,
            ticker: row.get(1)?,
            age: row.get(2)?,
            market_cap: row.get(3)?,
            liquidity: row.get(4)?,
            volume: row.get(5)?,
            ath_seconds: row.get(6)?,
            status: row.get(7)?,
            thread_ref: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<AssetRecord, StoreError> {
        let address = self.address;
        let corrupt = |reason: String| StoreError::Corrupt {
            address: address.clone(),
            reason,
        };
        let decimal = |value: Option<String>| -> Result<Option<Decimal>, StoreError> {
            value
                .map(|v| Decimal::from_str(&v).map_err(|e| corrupt(format!("amount {v}: {e}"))))
                .transpose()
        };

        let market_cap = decimal(self.market_cap)?;
        let liquidity = decimal(self.liquidity)?;
        let volume = decimal(self.volume)?;
        let status = RecordStatus::from_str(&self.status).map_err(corrupt)?;

        Ok(AssetRecord {
            address: address.clone(),
            ticker: self.ticker,
            age: self.age,
            market_cap,
            liquidity,
            volume,
            ath_seconds: self.ath_seconds.map(|s| s.max(0) as u64),
            status,
            thread_ref: self.thread_ref,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_record(address: &str, status: RecordStatus) -> AssetRecord {
        AssetRecord {
            address: address.to_string(),
            ticker: "TEST".to_string(),
            age: "10m".to_string(),
            market_cap: Some(dec!(100000)),
            liquidity: Some(dec!(5000)),
            volume: Some(dec!(1000.5)),
            ath_seconds: Some(30),
            status,
            thread_ref: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn upsert_and_get_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_record("CA_TEST_001", RecordStatus::Processing))
            .unwrap();

        let record = store.get_record("CA_TEST_001").unwrap().unwrap();
        assert_eq!(record.ticker, "TEST");
        assert_eq!(record.volume, Some(dec!(1000.5)));
        assert_eq!(record.ath_seconds, Some(30));
        assert_eq!(record.status, RecordStatus::Processing);
        assert!(!record.updated_at.is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn missing_record_has_no_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_status("NON_EXISTENT_CA").unwrap(), None);
        assert!(store.get_record("NON_EXISTENT_CA").unwrap().is_none());
    }

    #[test]
    fn upsert_keeps_thread_ref_when_new_value_is_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut record = make_record("CA_TEST_002", RecordStatus::Processing);
        record.thread_ref = Some(12345);
        store.upsert(&record).unwrap();

        let mut update = make_record("CA_TEST_002", RecordStatus::Processing);
        update.ticker = "TEST2_UPD".to_string();
        update.thread_ref = None;
        store.upsert(&update).unwrap();

        let stored = store.get_record("CA_TEST_002").unwrap().unwrap();
        assert_eq!(stored.ticker, "TEST2_UPD");
        assert_eq!(stored.thread_ref, Some(12345));

        update.thread_ref = Some(67890);
        store.upsert(&update).unwrap();
        let stored = store.get_record("CA_TEST_002").unwrap().unwrap();
        assert_eq!(stored.thread_ref, Some(67890));
    }

    #[test]
    fn upsert_overwrites_other_fields_with_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_record("CA_TEST_003", RecordStatus::Processing))
            .unwrap();

        let mut update = make_record("CA_TEST_003", RecordStatus::Processing);
        update.ath_seconds = None;
        update.volume = None;
        store.upsert(&update).unwrap();

        let stored = store.get_record("CA_TEST_003").unwrap().unwrap();
        assert_eq!(stored.ath_seconds, None);
        assert_eq!(stored.volume, None);
    }

    #[test]
    fn update_status_of_known_and_unknown() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_record("CA_TEST_001", RecordStatus::Processing))
            .unwrap();

        assert!(store
            .update_status("CA_TEST_001", RecordStatus::BuySuccess)
            .unwrap());
        assert_eq!(
            store.get_status("CA_TEST_001").unwrap(),
            Some(RecordStatus::BuySuccess)
        );
        assert!(!store
            .update_status("CA_UNKNOWN", RecordStatus::BuySuccess)
            .unwrap());
    }

    #[test]
    fn corrupt_status_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO asset_records (address, ticker, age, status, updated_at) \
                 VALUES ('CA_BAD', 'BAD', '1m', 'Mystery', '')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.get_status("CA_BAD"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn clear_removes_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .unwrap();
        store
            .upsert(&make_record("CA_2", RecordStatus::SellSuccess))
            .unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn wal_mode_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .unwrap();
        drop(store);

        let reopened = SqliteStore::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
