use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tracing::debug;

use crate::error::StorageError;
use crate::{ObjectStorage, StoredObject};

type Buckets = BTreeMap<String, BTreeMap<String, Bytes>>;

/// Buckets held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    buckets: RwLock<Buckets>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Buckets>, StorageError> {
        self.buckets
            .read()
            .map_err(|e| StorageError::LockPoisoned(format!("buckets read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Buckets>, StorageError> {
        self.buckets
            .write()
            .map_err(|e| StorageError::LockPoisoned(format!("buckets write lock: {}", e)))
    }
}

fn not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

impl ObjectStorage for InMemoryStorage {
    fn list_all_files(&self, bucket: &str) -> Result<Vec<StoredObject>, StorageError> {
        let buckets = self.read()?;
        Ok(buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .map(|(key, data)| StoredObject {
                        bucket: bucket.to_string(),
                        key: key.clone(),
                        size: data.len() as u64,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError> {
        debug!(bucket, key, size = data.len(), "upload");
        self.write()?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.read()?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| not_found(bucket, key))
    }

    fn copy(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError> {
        let data = self.download(from_bucket, key)?;
        self.upload(to_bucket, key, data)
    }

    fn move_between_buckets(&self, from_bucket: &str, to_bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut buckets = self.write()?;
        let data = buckets
            .get_mut(from_bucket)
            .and_then(|objects| objects.remove(key))
            .ok_or_else(|| not_found(from_bucket, key))?;
        buckets.entry(to_bucket.to_string()).or_default().insert(key.to_string(), data);
        Ok(())
    }

    fn delete_file(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.write()?
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| not_found(bucket, key))
    }

    fn delete_all_in_bucket(&self, bucket: &str) -> Result<usize, StorageError> {
        let mut buckets = self.write()?;
        Ok(buckets
            .get_mut(bucket)
            .map(|objects| std::mem::take(objects).len())
            .unwrap_or(0))
    }

    fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.write()?.entry(bucket.to_string()).or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_list_download() {
        let s = InMemoryStorage::new();
        s.upload("pending", "b.zip", Bytes::from_static(b"12345")).unwrap();
        s.upload("pending", "a.zip", Bytes::from_static(b"1")).unwrap();

        let files = s.list_all_files("pending").unwrap();
        assert_eq!(files.iter().map(|f| f.key.as_str()).collect::<Vec<_>>(), vec!["a.zip", "b.zip"]);
        assert_eq!(files[1].size, 5);
        assert_eq!(s.download("pending", "b.zip").unwrap(), Bytes::from_static(b"12345"));
        assert!(s.list_all_files("missing").unwrap().is_empty());
    }

    #[test]
    fn move_removes_from_source() {
        let s = InMemoryStorage::new();
        s.upload("pending", "a.zip", Bytes::from_static(b"abc")).unwrap();
        s.move_between_buckets("pending", "processing", "a.zip").unwrap();

        assert!(s.list_all_files("pending").unwrap().is_empty());
        assert_eq!(s.list_all_files("processing").unwrap().len(), 1);
        assert!(matches!(
            s.move_between_buckets("pending", "processing", "a.zip"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_all_keeps_bucket() {
        let s = InMemoryStorage::new();
        s.upload("pending", "a", Bytes::from_static(b"1")).unwrap();
        s.upload("pending", "b", Bytes::from_static(b"2")).unwrap();
        s.copy("pending", "processing", "a").unwrap();

        assert_eq!(s.delete_all_in_bucket("pending").unwrap(), 2);
        assert_eq!(s.delete_all_in_bucket("nope").unwrap(), 0);
        assert_eq!(s.list_buckets().unwrap(), vec!["pending", "processing"]);
        s.delete_file("processing", "a").unwrap();
        assert!(s.download("processing", "a").is_err());
    }
}
