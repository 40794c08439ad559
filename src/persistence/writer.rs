use std::fs::OpenOptions;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::consent::{TrackingConsent, TrackingConsentProvider};
use crate::core::feature::Feature;
use crate::logger::SDK_LOGGER;
use crate::persistence::encoding::encode_record;
use crate::persistence::error::{io_error, item_too_large, serialization_error, StorageResult};
use crate::persistence::storage::ConsentAwareStorage;
use crate::platform::worker::{SingleWorker, WorkerTask};

pub type SharedStorage = Arc<Mutex<ConsentAwareStorage>>;

pub(crate) fn lock_storage(storage: &SharedStorage) -> MutexGuard<'_, ConsentAwareStorage> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point from feature logic into durable storage.
pub trait DataWriter<T>: Send + Sync {
    fn write(&self, element: T);

    /// Persists `element` before returning. Writers that queue must override this; the
    /// default is only correct for writers whose `write` is already synchronous.
    fn write_immediately(&self, element: T) -> bool {
        self.write(element);
        true
    }
}

impl<T, W> DataWriter<T> for Arc<W>
where
    W: DataWriter<T> + ?Sized,
{
    fn write(&self, element: T) {
        (**self).write(element)
    }

    fn write_immediately(&self, element: T) -> bool {
        (**self).write_immediately(element)
    }
}

/// Discards everything; used when a feature is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpWriter;

impl<T> DataWriter<T> for NoOpWriter {
    fn write(&self, _element: T) {}

    fn write_immediately(&self, _element: T) -> bool {
        false
    }
}

enum WriterCommand<T> {
    Write(T),
    ConsentChanged {
        previous: TrackingConsent,
        current: TrackingConsent,
    },
}

struct WriterCore {
    feature: Feature,
    storage: SharedStorage,
    consent: Arc<TrackingConsentProvider>,
    max_item_size: usize,
}

/// Appends one encoded record. The hot file's budget is only kept when the bytes were written.
fn append_record(
    storage: &mut ConsentAwareStorage,
    consent: TrackingConsent,
    record: &[u8],
) -> StorageResult<bool> {
    let size = record.len() as u64;
    let Some(path) = storage.writable_file(consent, size)? else {
        return Ok(false);
    };
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| io_error("open batch file", &path, err))
        .and_then(|mut file| {
            file.write_all(record)
                .map_err(|err| io_error("append to batch file", &path, err))
        });
    if let Err(err) = appended {
        storage.cancel_write(consent, &path, size);
        return Err(err);
    }
    Ok(true)
}

impl WriterCore {
    /// Serializes, obfuscates and appends one element. Returns `false` when the consent
    /// state says the element must be discarded.
    fn persist<T: Serialize>(&self, element: &T) -> StorageResult<bool> {
        let consent = self.consent.consent();
        if consent == TrackingConsent::NotGranted {
            return Ok(false);
        }
        let record = self.encode(element)?;
        let mut storage = lock_storage(&self.storage);
        append_record(&mut storage, consent, &record)
    }

    /// Same as [`persist`](Self::persist), but never waits for the storage lock. Used from the
    /// crash path, which may run on a thread that already holds it.
    fn try_persist<T: Serialize>(&self, element: &T) -> StorageResult<bool> {
        let consent = self.consent.consent();
        if consent == TrackingConsent::NotGranted {
            return Ok(false);
        }
        let record = self.encode(element)?;
        let mut storage = match self.storage.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::warn!("{}: storage busy, dropping synchronous write", self.feature);
                return Ok(false);
            }
        };
        append_record(&mut storage, consent, &record)
    }

    fn encode<T: Serialize>(&self, element: &T) -> StorageResult<Vec<u8>> {
        let serialized = serde_json::to_vec(element).map_err(serialization_error)?;
        if serialized.len() >= self.max_item_size {
            return Err(item_too_large(serialized.len(), self.max_item_size));
        }
        Ok(encode_record(&serialized))
    }

    fn persist_logged<T: Serialize>(&self, element: &T) -> bool {
        self.logged(self.persist(element))
    }

    fn try_persist_logged<T: Serialize>(&self, element: &T) -> bool {
        self.logged(self.try_persist(element))
    }

    fn logged(&self, result: StorageResult<bool>) -> bool {
        match result {
            Ok(written) => written,
            Err(err) => {
                log::error!("{}: dropping event: {err}", self.feature);
                false
            }
        }
    }

    fn apply_consent_change(&self, previous: TrackingConsent, current: TrackingConsent) {
        if let Err(err) = lock_storage(&self.storage).on_consent_changed(previous, current) {
            log::error!(
                "{}: failed to apply consent change {previous} -> {current}: {err}",
                self.feature
            );
        }
    }
}

struct WriterTask<T> {
    core: Arc<WriterCore>,
    _element: PhantomData<fn(T)>,
}

#[async_trait]
impl<T> WorkerTask for WriterTask<T>
where
    T: Serialize + Send + 'static,
{
    type Message = WriterCommand<T>;

    async fn on_message(&mut self, message: WriterCommand<T>) -> Option<Duration> {
        match message {
            WriterCommand::Write(element) => {
                self.core.persist_logged(&element);
            }
            WriterCommand::ConsentChanged { previous, current } => {
                self.core.apply_consent_change(previous, current);
            }
        }
        None
    }
}

/// Persistence writer of one feature.
///
/// [`write`](DataWriter::write) only enqueues: serialization and file I/O happen on the
/// feature's own worker, so appends to that feature's files are strictly ordered. When the
/// storage directories cannot be created the writer is inert for its whole life.
pub struct FeatureWriter<T> {
    feature: Feature,
    core: Option<Arc<WriterCore>>,
    worker: Option<SingleWorker<WriterCommand<T>>>,
}

impl<T> std::fmt::Debug for FeatureWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureWriter")
            .field("feature", &self.feature)
            .field("inert", &self.worker.is_none())
            .finish()
    }
}

impl<T> FeatureWriter<T>
where
    T: Serialize + Send + 'static,
{
    pub fn new(storage: SharedStorage, consent: Arc<TrackingConsentProvider>) -> Self {
        let (feature, max_item_size, capacity, ready) = {
            let guard = lock_storage(&storage);
            (
                guard.feature(),
                guard.config().max_item_size,
                guard.config().queue_capacity,
                guard.ensure_directories(),
            )
        };
        if let Err(err) = ready {
            log::error!("{feature}: storage unavailable, writer disabled: {err}");
            SDK_LOGGER.error(format!(
                "{feature} data will not be persisted: storage is unavailable"
            ));
            return Self::inert(feature);
        }

        let core = Arc::new(WriterCore {
            feature,
            storage,
            consent,
            max_item_size,
        });
        let task = WriterTask {
            core: Arc::clone(&core),
            _element: PhantomData,
        };
        match SingleWorker::spawn(format!("rum-sdk-writer-{feature}"), capacity, None, task) {
            Ok(worker) => Self {
                feature,
                core: Some(core),
                worker: Some(worker),
            },
            Err(err) => {
                log::error!("{feature}: could not start writer worker: {err}");
                Self::inert(feature)
            }
        }
    }

    pub fn inert(feature: Feature) -> Self {
        Self {
            feature,
            core: None,
            worker: None,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn is_inert(&self) -> bool {
        self.worker.is_none()
    }

    /// Persists `element` on the calling thread, bypassing the queue. Meant for the crash
    /// path, where the process may not live long enough for the worker to run. Gives up and
    /// returns `false` when another thread holds the storage.
    pub fn write_now(&self, element: &T) -> bool {
        match &self.core {
            Some(core) => core.try_persist_logged(element),
            None => false,
        }
    }

    pub fn on_consent_changed(&self, previous: TrackingConsent, current: TrackingConsent) {
        if let Some(worker) = &self.worker {
            worker.submit(WriterCommand::ConsentChanged { previous, current });
        }
    }

    /// Persists everything already queued, then stops the worker.
    pub fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.shutdown();
        }
    }
}

impl<T> DataWriter<T> for FeatureWriter<T>
where
    T: Serialize + Send + 'static,
{
    fn write(&self, element: T) {
        if let Some(worker) = &self.worker {
            worker.submit(WriterCommand::Write(element));
        }
    }

    fn write_immediately(&self, element: T) -> bool {
        self.write_now(&element)
    }
}

/// Routes [`DataWriter::write`] to [`DataWriter::write_immediately`] of the wrapped writer.
pub struct ImmediateWriter<'a, W: ?Sized>(pub &'a W);

impl<T, W> DataWriter<T> for ImmediateWriter<'_, W>
where
    W: DataWriter<T> + ?Sized,
{
    fn write(&self, element: T) {
        self.0.write_immediately(element);
    }

    fn write_immediately(&self, element: T) -> bool {
        self.0.write_immediately(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::encoding::decode_batch;
    use crate::persistence::PersistenceConfig;
    use crate::test_support::{unique_dir, ManualTimeProvider};
    use serde_json::{json, Value};
    use std::fs;

    fn shared_storage(config: PersistenceConfig) -> SharedStorage {
        Arc::new(Mutex::new(ConsentAwareStorage::new(
            Feature::Logs,
            &unique_dir("writer"),
            config,
            Arc::new(ManualTimeProvider::new(10_000)),
        )))
    }

    fn granted_records(storage: &SharedStorage) -> Vec<Value> {
        let mut guard = lock_storage(storage);
        guard
            .granted()
            .all_files()
            .unwrap()
            .into_iter()
            .flat_map(|path| decode_batch(&fs::read(path).unwrap()))
            .map(|record| serde_json::from_slice(&record).unwrap())
            .collect()
    }

    #[test]
    fn writes_are_persisted_in_order() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted));
        let writer = FeatureWriter::new(Arc::clone(&storage), consent);

        for index in 0..20 {
            writer.write(json!({ "index": index }));
        }
        writer.shutdown();

        let records = granted_records(&storage);
        let indices: Vec<_> = records.iter().map(|r| r["index"].as_i64().unwrap()).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn written_record_round_trips_byte_for_byte() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted));
        let writer = FeatureWriter::new(Arc::clone(&storage), consent);
        let event = json!({ "message": "multi\nline", "emoji": "\u{1f680}" });

        assert!(writer.write_now(&event));

        let mut guard = lock_storage(&storage);
        let files = guard.granted().all_files().unwrap();
        let decoded = decode_batch(&fs::read(&files[0]).unwrap());
        assert_eq!(decoded, vec![serde_json::to_vec(&event).unwrap()]);
    }

    #[test]
    fn oversized_records_are_dropped() {
        let storage = shared_storage(PersistenceConfig::default().with_max_item_size(32));
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted));
        let writer = FeatureWriter::new(Arc::clone(&storage), consent);

        assert!(!writer.write_now(&json!({ "payload": "x".repeat(64) })));
        assert!(writer.write_now(&json!({ "ok": 1 })));
        assert_eq!(granted_records(&storage), vec![json!({ "ok": 1 })]);
    }

    #[test]
    fn not_granted_consent_discards_events() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::NotGranted));
        let writer = FeatureWriter::new(Arc::clone(&storage), consent);

        assert!(!writer.write_now(&json!({ "dropped": true })));
        let mut guard = lock_storage(&storage);
        assert!(guard.granted().all_files().unwrap().is_empty());
        assert!(guard.pending().all_files().unwrap().is_empty());
    }

    #[test]
    fn pending_events_become_granted_after_consent() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Pending));
        let writer = FeatureWriter::new(Arc::clone(&storage), Arc::clone(&consent));

        writer.write(json!({ "early": true }));
        let previous = consent.set_consent(TrackingConsent::Granted);
        writer.on_consent_changed(previous, TrackingConsent::Granted);
        writer.write(json!({ "late": true }));
        writer.shutdown();

        let records = granted_records(&storage);
        assert_eq!(records, vec![json!({ "early": true }), json!({ "late": true })]);
    }

    #[test]
    fn immediate_writer_bypasses_the_queue() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted));
        let writer: FeatureWriter<Value> = FeatureWriter::new(Arc::clone(&storage), consent);

        ImmediateWriter(&writer).write(json!({ "crash": true }));
        assert_eq!(granted_records(&storage), vec![json!({ "crash": true })]);
        writer.shutdown();
    }

    #[test]
    fn synchronous_write_gives_up_while_storage_is_held() {
        let storage = shared_storage(PersistenceConfig::default());
        let consent = Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted));
        let writer: FeatureWriter<Value> = FeatureWriter::new(Arc::clone(&storage), consent);

        {
            let _held = lock_storage(&storage);
            assert!(!writer.write_now(&json!({ "crash": "busy" })));
        }
        assert!(writer.write_now(&json!({ "crash": "free" })));
        assert_eq!(granted_records(&storage), vec![json!({ "crash": "free" })]);
        writer.shutdown();
    }

    #[test]
    fn unusable_directory_makes_writer_inert() {
        let blocker = unique_dir("writer-blocker");
        fs::create_dir_all(&blocker).unwrap();
        let file_root = blocker.join("not-a-dir");
        fs::write(&file_root, b"file").unwrap();
        let storage = Arc::new(Mutex::new(ConsentAwareStorage::new(
            Feature::Rum,
            &file_root,
            PersistenceConfig::default(),
            Arc::new(ManualTimeProvider::new(0)),
        )));
        let writer: FeatureWriter<Value> = FeatureWriter::new(
            storage,
            Arc::new(TrackingConsentProvider::new(TrackingConsent::Granted)),
        );

        assert!(writer.is_inert());
        assert!(!writer.write_now(&json!({})));
        writer.write(json!({}));
    }
}
