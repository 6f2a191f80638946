use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use athwatch_models::record::{AssetRecord, RecordStatus};
use tracing::debug;

use crate::error::StoreError;
use crate::memory::HotRecords;
use crate::sqlite::SqliteStore;

/// Durable per-address state used to suppress repeat decisions and to track
/// execution outcomes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&self, record: &AssetRecord) -> Result<(), StoreError>;

    async fn get_status(&self, address: &str) -> Result<Option<RecordStatus>, StoreError>;

    async fn get_record(&self, address: &str) -> Result<Option<AssetRecord>, StoreError>;

    /// Returns false when no record exists for `address`.
    async fn update_status(&self, address: &str, status: RecordStatus) -> Result<bool, StoreError>;

    async fn clear(&self) -> Result<usize, StoreError>;
}

/// Read-through store: moka (hot) → SQLite (durable).
///
/// Writes go straight to SQLite and invalidate the hot copy. SQLite access is
/// synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
///
/// `writes` is bumped after every durable write and before its invalidation.
/// A read that saw it move while promoting drops its own hot copy, so a
/// record read just before a write never outlives that write in moka.
pub struct CachedRecordStore {
    memory: HotRecords,
    sqlite: Mutex<SqliteStore>,
    writes: AtomicU64,
}

impl CachedRecordStore {
    pub fn new(sqlite: SqliteStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: HotRecords::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
            writes: AtomicU64::new(0),
        }
    }

    /// Store over a fresh in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(
            SqliteStore::open_in_memory()?,
            1_000,
            Duration::from_secs(60),
        ))
    }

    fn sqlite(&self) -> Result<MutexGuard<'_, SqliteStore>, StoreError> {
        self.sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Number of records currently held in the hot cache.
    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.sqlite()?.count()
    }

    /// Read `address` from SQLite, with the write counter seen beforehand.
    fn read_durable(&self, address: &str) -> Result<(Option<AssetRecord>, u64), StoreError> {
        let seen = self.writes.load(Ordering::SeqCst);
        let record = self.sqlite()?.get_record(address)?;
        Ok((record, seen))
    }

    /// Put a durable read into the hot cache unless a write landed since.
    async fn promote(&self, record: AssetRecord, seen: u64) {
        let address = record.address.clone();
        self.memory.insert(record).await;
        if self.writes.load(Ordering::SeqCst) != seen {
            debug!(%address, "Write raced a read-through, hot copy dropped");
            self.memory.invalidate(&address).await;
        }
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CachedRecordStore {
    async fn upsert(&self, record: &AssetRecord) -> Result<(), StoreError> {
        self.sqlite()?.upsert(record)?;
        self.wrote();
        self.memory.invalidate(&record.address).await;
        debug!(address = %record.address, status = %record.status, "Record upserted");
        Ok(())
    }

    async fn get_status(&self, address: &str) -> Result<Option<RecordStatus>, StoreError> {
        Ok(self.get_record(address).await?.map(|r| r.status))
    }

    async fn get_record(&self, address: &str) -> Result<Option<AssetRecord>, StoreError> {
        if let Some(record) = self.memory.get(address).await {
            return Ok(Some(record));
        }

        let (record, seen) = self.read_durable(address)?;
        if let Some(record) = &record {
            self.promote(record.clone(), seen).await;
        }
        Ok(record)
    }

    async fn update_status(&self, address: &str, status: RecordStatus) -> Result<bool, StoreError> {
        let updated = self.sqlite()?.update_status(address, status)?;
        self.wrote();
        self.memory.invalidate(address).await;
        debug!(%address, %status, updated, "Record status updated");
        Ok(updated)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let deleted = self.sqlite()?.clear()?;
        self.wrote();
        self.memory.invalidate_all();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_record(address: &str, status: RecordStatus) -> AssetRecord {
        AssetRecord {
            address: address.to_string(),
            ticker: "PEPE".to_string(),
            age: "15m".to_string(),
            market_cap: Some(dec!(250000)),
            liquidity: Some(dec!(40000)),
            volume: Some(dec!(90000)),
            ath_seconds: Some(20),
            status,
            thread_ref: None,
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn read_through_promotes_to_hot_cache() {
        let store = CachedRecordStore::in_memory().unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .await
            .unwrap();

        let first = store.get_record("CA_1").await.unwrap().unwrap();
        assert_eq!(first.ticker, "PEPE");
        assert!(store.memory.get("CA_1").await.is_some());

        let second = store.get_status("CA_1").await.unwrap();
        assert_eq!(second, Some(RecordStatus::Processing));
    }

    #[tokio::test]
    async fn status_update_is_not_masked_by_hot_copy() {
        let store = CachedRecordStore::in_memory().unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .await
            .unwrap();
        // Warm the hot cache.
        store.get_record("CA_1").await.unwrap();

        assert!(store
            .update_status("CA_1", RecordStatus::BuySuccess)
            .await
            .unwrap());
        assert_eq!(
            store.get_status("CA_1").await.unwrap(),
            Some(RecordStatus::BuySuccess)
        );
    }

    #[tokio::test]
    async fn write_between_read_and_promote_is_not_masked() {
        let store = CachedRecordStore::in_memory().unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .await
            .unwrap();

        // A reader fetches the row, then a status update lands before the
        // reader promotes it.
        let (stale, seen) = store.read_durable("CA_1").unwrap();
        assert!(store
            .update_status("CA_1", RecordStatus::SellSuccess)
            .await
            .unwrap());
        store.promote(stale.unwrap(), seen).await;

        assert!(store.memory.get("CA_1").await.is_none());
        assert_eq!(
            store.get_status("CA_1").await.unwrap(),
            Some(RecordStatus::SellSuccess)
        );
    }

    #[tokio::test]
    async fn unknown_address() {
        let store = CachedRecordStore::in_memory().unwrap();
        assert_eq!(store.get_status("CA_NOPE").await.unwrap(), None);
        assert!(!store
            .update_status("CA_NOPE", RecordStatus::SellSuccess)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn clear_drops_durable_and_hot_records() {
        let store = CachedRecordStore::in_memory().unwrap();
        store
            .upsert(&make_record("CA_1", RecordStatus::Processing))
            .await
            .unwrap();
        store
            .upsert(&make_record("CA_2", RecordStatus::BuyFailed))
            .await
            .unwrap();
        store.get_record("CA_1").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.get_record("CA_1").await.unwrap().is_none());
    }
}
