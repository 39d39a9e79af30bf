//! In-memory conversation store
//!
//! Everything is lost on restart. Suitable for tests and single-process
//! deployments that don't need durable progress.

use super::{
    Address, ConversationKey, ConversationRecord, ConversationStore, DataMap, StepPointer,
    StoreError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Conversation store backed by a `HashMap`
#[derive(Default)]
pub struct MemoryStorage {
    pub(super) records: RwLock<HashMap<ConversationKey, ConversationRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty records currently held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    #[allow(dead_code)] // API completeness
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    #[allow(dead_code)] // API completeness
    pub async fn contains(&self, address: &Address) -> Result<bool, StoreError> {
        let key = address.resolve()?;
        Ok(self.records.read().await.contains_key(&key))
    }

    async fn read<T>(
        &self,
        address: &Address,
        f: impl FnOnce(&ConversationRecord) -> T,
    ) -> Result<T, StoreError> {
        let key = address.resolve()?;
        let records = self.records.read().await;
        let empty = ConversationRecord::default();
        Ok(f(records.get(&key).unwrap_or(&empty)))
    }

    /// Apply `f` to the record (created on demand) and prune it if it ends up empty
    async fn write(
        &self,
        address: &Address,
        f: impl FnOnce(&mut ConversationRecord),
    ) -> Result<(), StoreError> {
        let key = address.resolve()?;
        let mut records = self.records.write().await;
        let record = records.entry(key.clone()).or_default();
        f(record);
        if record.is_empty() {
            records.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStorage {
    async fn get_state(&self, address: &Address) -> Result<Option<StepPointer>, StoreError> {
        self.read(address, |r| r.state.clone()).await
    }

    async fn set_state(
        &self,
        address: &Address,
        state: Option<StepPointer>,
    ) -> Result<(), StoreError> {
        self.write(address, |r| r.state = state).await
    }

    async fn get_data(&self, address: &Address) -> Result<DataMap, StoreError> {
        self.read(address, |r| r.data.clone()).await
    }

    async fn set_data(&self, address: &Address, data: DataMap) -> Result<(), StoreError> {
        self.write(address, |r| r.data = data).await
    }

    async fn update_data(&self, address: &Address, patch: DataMap) -> Result<(), StoreError> {
        self.write(address, |r| r.data.extend(patch)).await
    }

    async fn get_bucket(&self, address: &Address) -> Result<DataMap, StoreError> {
        self.read(address, |r| r.bucket.clone()).await
    }

    async fn set_bucket(&self, address: &Address, bucket: DataMap) -> Result<(), StoreError> {
        self.write(address, |r| r.bucket = bucket).await
    }

    async fn update_bucket(&self, address: &Address, patch: DataMap) -> Result<(), StoreError> {
        self.write(address, |r| r.bucket.extend(patch)).await
    }

    async fn reset_state(&self, address: &Address, with_data: bool) -> Result<(), StoreError> {
        self.write(address, |r| {
            r.state = None;
            if with_data {
                r.data.clear();
            }
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn load_record(&self, address: &Address) -> Result<ConversationRecord, StoreError> {
        self.read(address, Clone::clone).await
    }

    async fn save_record(
        &self,
        address: &Address,
        record: ConversationRecord,
    ) -> Result<(), StoreError> {
        self.write(address, |r| *r = record).await
    }
}
