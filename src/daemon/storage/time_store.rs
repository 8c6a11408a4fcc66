use std::{future::Future, ops::Deref, path::PathBuf};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, sync::Mutex};
use tracing::{debug, warn};

use crate::fs::operations::{read_if_exists, write_atomically};

use super::entities::{DomainRecord, StorageDetails, TimeData};

/// Interface for abstracting storage of domain records.
///
/// Every mutation is an atomic read-modify-write: no writer can observe or overwrite a stale
/// intermediate value of another writer.
pub trait TimeStore {
    fn get_record(&self, domain: &str) -> impl Future<Output = Result<Option<DomainRecord>>>;

    /// Applies `mutator` to the current record of `domain` (or to a zero record if the domain is
    /// unknown) and stores the result.
    fn upsert_record<F>(
        &self,
        domain: &str,
        mutator: F,
    ) -> impl Future<Output = Result<DomainRecord>>
    where
        F: FnOnce(DomainRecord) -> DomainRecord;

    /// Stores `record` verbatim, replacing whatever was there.
    fn put_record(&self, domain: &str, record: DomainRecord) -> impl Future<Output = Result<()>>;

    /// Removes the record and returns it.
    fn delete_record(&self, domain: &str) -> impl Future<Output = Result<Option<DomainRecord>>>;

    fn clear_all(&self) -> impl Future<Output = Result<()>>;

    /// Returns every record, order is unspecified.
    fn list_records(&self) -> impl Future<Output = Result<Vec<(String, DomainRecord)>>>;

    fn storage_details(&self) -> impl Future<Output = Result<StorageDetails>>;
}

impl<T: Deref> TimeStore for T
where
    T::Target: TimeStore,
{
    fn get_record(&self, domain: &str) -> impl Future<Output = Result<Option<DomainRecord>>> {
        self.deref().get_record(domain)
    }

    fn upsert_record<F>(
        &self,
        domain: &str,
        mutator: F,
    ) -> impl Future<Output = Result<DomainRecord>>
    where
        F: FnOnce(DomainRecord) -> DomainRecord,
    {
        self.deref().upsert_record(domain, mutator)
    }

    fn put_record(&self, domain: &str, record: DomainRecord) -> impl Future<Output = Result<()>> {
        self.deref().put_record(domain, record)
    }

    fn delete_record(&self, domain: &str) -> impl Future<Output = Result<Option<DomainRecord>>> {
        self.deref().delete_record(domain)
    }

    fn clear_all(&self) -> impl Future<Output = Result<()>> {
        self.deref().clear_all()
    }

    fn list_records(&self) -> impl Future<Output = Result<Vec<(String, DomainRecord)>>> {
        self.deref().list_records()
    }

    fn storage_details(&self) -> impl Future<Output = Result<StorageDetails>> {
        self.deref().storage_details()
    }
}

/// The main realization of [TimeStore]. The whole document is a single JSON file that is
/// replaced atomically on every mutation.
///
/// Access inside the process is serialized by a mutex. A sidecar lock file is held while the
/// document is read or replaced, so that the `report` command never sees a half-applied change.
pub struct FileTimeStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl FileTimeStore {
    pub const FILE_NAME: &'static str = "time_data.json";
    const LOCK_NAME: &'static str = "time_data.lock";

    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(Self::FILE_NAME),
            lock_path: dir.join(Self::LOCK_NAME),
            guard: Mutex::new(()),
        })
    }

    async fn open_lock(&self) -> Result<File> {
        File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .await
            .with_context(|| format!("Failed to open lock file {:?}", self.lock_path))
    }

    async fn read_document(&self) -> Result<(TimeData, u64)> {
        let Some(bytes) = read_if_exists(&self.path).await? else {
            debug!("No time document at {:?} yet", self.path);
            return Ok((TimeData::new(), 0));
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            warn!("Time document {:?} is empty", self.path);
            return Ok((TimeData::new(), bytes.len() as u64));
        }
        let data = serde_json::from_slice::<TimeData>(&bytes)
            .with_context(|| format!("Time document {:?} is corrupted", self.path))?;
        Ok((data, bytes.len() as u64))
    }

    async fn write_document(&self, data: &TimeData) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        write_atomically(&self.path, &bytes)
            .await
            .with_context(|| format!("Failed to write time document {:?}", self.path))
    }

    /// Runs `f` over the document under the shared lock.
    async fn read<T>(&self, f: impl FnOnce(TimeData, u64) -> T) -> Result<T> {
        let _guard = self.guard.lock().await;
        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let result = self.read_document().await;
        lock.unlock_async().await?;
        let (data, bytes) = result?;
        Ok(f(data, bytes))
    }

    /// Read-modify-write of the whole document. Nothing is written if reading fails, and the
    /// value produced by `f` is only returned once the new document is on disk.
    async fn mutate<T>(&self, f: impl FnOnce(&mut TimeData) -> T) -> Result<T> {
        let _guard = self.guard.lock().await;
        let lock = self.open_lock().await?;
        // Semi-safe acquire-release for a file
        lock.lock_exclusive()?;
        let result = async {
            let (mut data, _) = self.read_document().await?;
            let value = f(&mut data);
            self.write_document(&data).await?;
            Ok::<_, anyhow::Error>(value)
        }
        .await;
        lock.unlock_async().await?;
        result
    }
}

impl TimeStore for FileTimeStore {
    async fn get_record(&self, domain: &str) -> Result<Option<DomainRecord>> {
        self.read(|mut data, _| data.remove(domain)).await
    }

    async fn upsert_record<F>(&self, domain: &str, mutator: F) -> Result<DomainRecord>
    where
        F: FnOnce(DomainRecord) -> DomainRecord,
    {
        self.mutate(|data| {
            let current = data.remove(domain).unwrap_or_default();
            let updated = mutator(current);
            data.insert(domain.to_owned(), updated.clone());
            updated
        })
        .await
    }

    async fn put_record(&self, domain: &str, record: DomainRecord) -> Result<()> {
        self.mutate(|data| {
            data.insert(domain.to_owned(), record);
        })
        .await
    }

    async fn delete_record(&self, domain: &str) -> Result<Option<DomainRecord>> {
        self.mutate(|data| data.remove(domain)).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.mutate(|data| data.clear()).await
    }

    async fn list_records(&self) -> Result<Vec<(String, DomainRecord)>> {
        self.read(|data, _| data.into_iter().collect()).await
    }

    async fn storage_details(&self) -> Result<StorageDetails> {
        self.read(|data, bytes| StorageDetails {
            sites: data.len(),
            bytes,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::entities::DomainRecord;

    use super::{FileTimeStore, TimeStore};

    fn test_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
    }

    fn add_seconds(seconds: u64) -> impl FnOnce(DomainRecord) -> DomainRecord {
        move |mut record| {
            record.accrue(test_day(), seconds);
            record.touch(Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap());
            record
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_and_updates() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileTimeStore::new(dir.path().to_owned())?;

        assert_eq!(storage.get_record("a.com").await?, None);

        let created = storage.upsert_record("a.com", add_seconds(5)).await?;
        assert_eq!(created.total_time, 5);

        let updated = storage.upsert_record("a.com", add_seconds(3)).await?;
        assert_eq!(updated.total_time, 8);
        assert_eq!(updated.day(test_day()).total_time, 8);

        // A fresh handle reads what the first one wrote.
        let reopened = FileTimeStore::new(dir.path().to_owned())?;
        assert_eq!(reopened.get_record("a.com").await?, Some(updated));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_lose_increments() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(FileTimeStore::new(dir.path().to_owned())?);

        let writes = (0..20).map(|_| storage.upsert_record("a.com", add_seconds(1)));
        for result in futures::future::join_all(writes).await {
            result?;
        }

        let record = storage.get_record("a.com").await?.unwrap();
        assert_eq!(record.total_time, 20);
        assert!(record.is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_put_and_clear() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileTimeStore::new(dir.path().to_owned())?;
        storage.upsert_record("a.com", add_seconds(5)).await?;
        storage.upsert_record("b.com", add_seconds(2)).await?;

        let removed = storage.delete_record("a.com").await?;
        assert_eq!(removed.as_ref().map(|v| v.total_time), Some(5));
        assert_eq!(storage.get_record("a.com").await?, None);
        assert_eq!(storage.delete_record("a.com").await?, None);

        storage.put_record("a.com", removed.unwrap()).await?;
        let mut listed = storage.list_records().await?;
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            listed.iter().map(|v| v.0.as_str()).collect::<Vec<_>>(),
            vec!["a.com", "b.com"]
        );

        let details = storage.storage_details().await?;
        assert_eq!(details.sites, 2);
        assert!(details.bytes > 0);

        storage.clear_all().await?;
        assert!(storage.list_records().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_document_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(FileTimeStore::FILE_NAME);
        std::fs::write(&path, "{\"a.com\": {\"totalTi")?;
        let storage = FileTimeStore::new(dir.path().to_owned())?;

        assert!(storage.upsert_record("a.com", add_seconds(1)).await.is_err());
        assert_eq!(std::fs::read_to_string(&path)?, "{\"a.com\": {\"totalTi");
        Ok(())
    }
}
