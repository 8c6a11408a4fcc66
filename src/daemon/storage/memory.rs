use anyhow::Result;
use tokio::sync::Mutex;

use super::{
    entities::{DomainRecord, StorageDetails, TimeData},
    time_store::TimeStore,
};

/// In-process [TimeStore]. Nothing survives a restart; useful when embedding the tracker and in
/// tests.
#[derive(Default)]
pub struct MemoryTimeStore {
    data: Mutex<TimeData>,
}

impl MemoryTimeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeStore for MemoryTimeStore {
    async fn get_record(&self, domain: &str) -> Result<Option<DomainRecord>> {
        Ok(self.data.lock().await.get(domain).cloned())
    }

    async fn upsert_record<F>(&self, domain: &str, mutator: F) -> Result<DomainRecord>
    where
        F: FnOnce(DomainRecord) -> DomainRecord,
    {
        let mut data = self.data.lock().await;
        let current = data.remove(domain).unwrap_or_default();
        let updated = mutator(current);
        data.insert(domain.to_owned(), updated.clone());
        Ok(updated)
    }

    async fn put_record(&self, domain: &str, record: DomainRecord) -> Result<()> {
        self.data.lock().await.insert(domain.to_owned(), record);
        Ok(())
    }

    async fn delete_record(&self, domain: &str) -> Result<Option<DomainRecord>> {
        Ok(self.data.lock().await.remove(domain))
    }

    async fn clear_all(&self) -> Result<()> {
        self.data.lock().await.clear();
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<(String, DomainRecord)>> {
        Ok(self
            .data
            .lock()
            .await
            .iter()
            .map(|(domain, record)| (domain.clone(), record.clone()))
            .collect())
    }

    async fn storage_details(&self) -> Result<StorageDetails> {
        let data = self.data.lock().await;
        Ok(StorageDetails {
            sites: data.len(),
            bytes: serde_json::to_vec(&*data)?.len() as u64,
        })
    }
}
