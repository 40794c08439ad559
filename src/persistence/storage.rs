use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::consent::TrackingConsent;
use crate::core::feature::Feature;
use crate::persistence::config::PersistenceConfig;
use crate::persistence::error::StorageResult;
use crate::persistence::orchestrator::FileOrchestrator;
use crate::platform::time::TimeProvider;

/// One feature's storage: a pending directory for data collected before the user answered the
/// consent question, and a granted directory that is the only one ever uploaded.
#[derive(Debug)]
pub struct ConsentAwareStorage {
    feature: Feature,
    pending: FileOrchestrator,
    granted: FileOrchestrator,
    config: PersistenceConfig,
}

impl ConsentAwareStorage {
    pub fn new(
        feature: Feature,
        root: &Path,
        config: PersistenceConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let pending = FileOrchestrator::new(
            root.join(feature.pending_dir_name()),
            config.clone(),
            Arc::clone(&time),
        );
        let granted =
            FileOrchestrator::new(root.join(feature.granted_dir_name()), config.clone(), time);
        Self {
            feature,
            pending,
            granted,
            config,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn ensure_directories(&self) -> StorageResult<()> {
        self.pending.ensure_directory()?;
        self.granted.ensure_directory()
    }

    /// Target file for a write under `consent`; `None` means the event must be discarded.
    pub fn writable_file(
        &mut self,
        consent: TrackingConsent,
        size_hint: u64,
    ) -> StorageResult<Option<PathBuf>> {
        match consent {
            TrackingConsent::Granted => self.granted.get_writable_file(size_hint).map(Some),
            TrackingConsent::Pending => self.pending.get_writable_file(size_hint).map(Some),
            TrackingConsent::NotGranted => Ok(None),
        }
    }

    /// Undoes the accounting of a [`writable_file`](Self::writable_file) call whose append failed.
    pub fn cancel_write(&mut self, consent: TrackingConsent, path: &Path, size_hint: u64) {
        match consent {
            TrackingConsent::Granted => self.granted.cancel_write(path, size_hint),
            TrackingConsent::Pending => self.pending.cancel_write(path, size_hint),
            TrackingConsent::NotGranted => {}
        }
    }

    pub fn granted(&mut self) -> &mut FileOrchestrator {
        &mut self.granted
    }

    pub fn pending(&mut self) -> &mut FileOrchestrator {
        &mut self.pending
    }

    /// Applies a consent transition to the files already on disk.
    pub fn on_consent_changed(
        &mut self,
        previous: TrackingConsent,
        current: TrackingConsent,
    ) -> StorageResult<()> {
        match (previous, current) {
            (TrackingConsent::Pending, TrackingConsent::Granted) => {
                let moved = self.pending.move_all_to(&mut self.granted)?;
                log::debug!("{}: {moved} pending batches granted", self.feature);
                Ok(())
            }
            (TrackingConsent::Pending, TrackingConsent::NotGranted)
            | (TrackingConsent::Granted, TrackingConsent::Pending)
            | (TrackingConsent::NotGranted, TrackingConsent::Pending) => {
                self.pending.delete_all()
            }
            _ => Ok(()),
        }
    }

    pub fn clear_all(&mut self) -> StorageResult<()> {
        self.pending.delete_all()?;
        self.granted.delete_all()
    }
}
