use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::persistence::error::{io_error, StorageResult};
use crate::persistence::writer::{lock_storage, SharedStorage};

/// Content of one granted batch file, the unit of upload and of the retry/drop decision.
#[derive(Clone, Debug)]
pub struct Batch {
    path: PathBuf,
    pub data: Bytes,
}

impl Batch {
    pub fn id(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hands out readable batches of a feature and remembers which ones are being uploaded so
/// the same file is never handed out twice.
#[derive(Debug)]
pub struct BatchReader {
    storage: SharedStorage,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl BatchReader {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Oldest readable granted batch, or `None` when nothing is ready. Empty files left by a
    /// failed append are deleted on the way.
    pub fn read_next_batch(&self) -> StorageResult<Option<Batch>> {
        let mut storage = lock_storage(&self.storage);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let Some(path) = storage.granted().get_readable_file(&in_flight)? else {
                return Ok(None);
            };
            let data = fs::read(&path).map_err(|err| io_error("read batch file", &path, err))?;
            if data.is_empty() {
                storage.granted().delete_file(&path)?;
                continue;
            }
            in_flight.insert(path.clone());
            return Ok(Some(Batch {
                path,
                data: Bytes::from(data),
            }));
        }
    }

    /// Ends the upload attempt of `batch`, deleting its file when `delete` is set.
    pub fn release_batch(&self, batch: &Batch, delete: bool) -> StorageResult<()> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&batch.path);
        if delete {
            lock_storage(&self.storage).granted().delete_file(&batch.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consent::TrackingConsent;
    use crate::core::feature::Feature;
    use crate::persistence::encoding::{decode_batch, encode_record};
    use crate::persistence::storage::ConsentAwareStorage;
    use crate::persistence::PersistenceConfig;
    use crate::test_support::{unique_dir, ManualTimeProvider};
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (SharedStorage, Arc<ManualTimeProvider>) {
        let time = Arc::new(ManualTimeProvider::new(50_000));
        let storage = ConsentAwareStorage::new(
            Feature::Rum,
            &unique_dir("reader"),
            PersistenceConfig::default(),
            time.clone(),
        );
        (Arc::new(Mutex::new(storage)), time)
    }

    fn append(storage: &SharedStorage, consent: TrackingConsent, record: &[u8]) {
        let encoded = encode_record(record);
        let path = lock_storage(storage)
            .writable_file(consent, encoded.len() as u64)
            .unwrap()
            .unwrap();
        let mut existing = fs::read(&path).unwrap_or_default();
        existing.extend(encoded);
        fs::write(path, existing).unwrap();
    }

    #[test]
    fn batches_are_locked_until_released() {
        let (storage, time) = setup();
        append(&storage, TrackingConsent::Granted, b"one");
        time.advance(Duration::from_secs(10));

        let reader = BatchReader::new(Arc::clone(&storage));
        let batch = reader.read_next_batch().unwrap().unwrap();
        assert_eq!(decode_batch(&batch.data), vec![b"one".to_vec()]);
        assert!(reader.read_next_batch().unwrap().is_none());

        reader.release_batch(&batch, false).unwrap();
        let again = reader.read_next_batch().unwrap().unwrap();
        assert_eq!(again.id(), batch.id());

        reader.release_batch(&again, true).unwrap();
        assert!(!again.path().exists());
        assert!(reader.read_next_batch().unwrap().is_none());
    }

    #[test]
    fn pending_batches_are_never_read() {
        let (storage, time) = setup();
        append(&storage, TrackingConsent::Pending, b"pending");
        time.advance(Duration::from_secs(10));

        let reader = BatchReader::new(storage);
        assert!(reader.read_next_batch().unwrap().is_none());
    }

    #[test]
    fn hot_file_is_not_read() {
        let (storage, _) = setup();
        append(&storage, TrackingConsent::Granted, b"hot");
        let reader = BatchReader::new(storage);
        assert!(reader.read_next_batch().unwrap().is_none());
    }
}
