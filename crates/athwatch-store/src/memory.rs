use athwatch_models::record::AssetRecord;
use moka::future::Cache;
use std::time::Duration;

/// In-memory hot copy of recently touched asset records, backed by moka.
///
/// Entries expire after the TTL and are invalidated on every write so a
/// status transition is never masked by a stale copy.
pub struct HotRecords {
    inner: Cache<String, AssetRecord>,
}

impl HotRecords {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, address: &str) -> Option<AssetRecord> {
        self.inner.get(address).await
    }

    pub async fn insert(&self, record: AssetRecord) {
        self.inner.insert(record.address.clone(), record).await;
    }

    pub async fn invalidate(&self, address: &str) {
        self.inner.invalidate(address).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
