use crate::error::Result;
use crate::offline::store::{
    LocalRecord, NewPendingMutation, OfflineStore, PendingMutation, RecordId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory offline store.
///
/// Keeps the cached view and the pending queue in maps; the queue is a
/// BTreeMap so iteration order is insertion order. Clones share state.
#[derive(Default, Clone)]
pub struct InMemoryOfflineStore {
    inner: Arc<InMemoryOfflineInner>,
}

#[derive(Default)]
struct InMemoryOfflineInner {
    records: RwLock<HashMap<RecordId, LocalRecord>>,
    pending: RwLock<BTreeMap<u64, PendingMutation>>,
    next_key: AtomicU64,
}

impl InMemoryOfflineStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for InMemoryOfflineStore {
    async fn list_records(&self) -> Result<Vec<LocalRecord>> {
        Ok(self.inner.records.read().await.values().cloned().collect())
    }

    async fn put_record(&self, record: &LocalRecord) -> Result<()> {
        self.inner
            .records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.inner.records.write().await.remove(id);
        Ok(())
    }

    async fn clear_records(&self) -> Result<()> {
        self.inner.records.write().await.clear();
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<PendingMutation>> {
        Ok(self.inner.pending.read().await.values().cloned().collect())
    }

    async fn enqueue_pending(&self, mutation: NewPendingMutation) -> Result<u64> {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner
            .pending
            .write()
            .await
            .insert(key, PendingMutation::from_parts(key, mutation));
        Ok(key)
    }

    async fn delete_pending(&self, key: u64) -> Result<()> {
        self.inner.pending.write().await.remove(&key);
        Ok(())
    }
}
