use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::feature::Feature;
use crate::persistence::BatchReader;
use crate::platform::worker::{SingleWorker, WorkerTask};
use crate::upload::uploader::{DataUploader, UploadStatus};
use crate::util::backoff::{calculate_backoff, BackoffConfig};

/// Delay before the next upload attempt of one feature.
///
/// Success resets it to the base interval, a retryable failure grows it exponentially up to the
/// configured maximum, and a terminal failure leaves it untouched.
#[derive(Clone, Debug)]
pub struct UploadDelay {
    config: BackoffConfig,
    failures: u32,
    current: Duration,
}

impl UploadDelay {
    pub fn new(base: Duration, max: Duration) -> Self {
        let config = BackoffConfig::new(base, max.max(base));
        Self {
            config,
            failures: 0,
            current: calculate_backoff(0, config),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
        self.current = calculate_backoff(0, self.config);
    }

    pub fn on_retryable_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.current = calculate_backoff(self.failures, self.config);
    }

    fn record(&mut self, status: UploadStatus) {
        if status.is_success() {
            self.on_success();
        } else if status.should_retry() {
            self.on_retryable_failure();
        }
    }
}

pub(crate) enum UploadCommand {
    Flush,
}

pub(crate) struct UploadTask {
    feature: Feature,
    reader: Arc<BatchReader>,
    uploader: Arc<dyn DataUploader>,
    delay: UploadDelay,
}

impl UploadTask {
    pub(crate) fn new(
        feature: Feature,
        reader: Arc<BatchReader>,
        uploader: Arc<dyn DataUploader>,
        delay: UploadDelay,
    ) -> Self {
        Self {
            feature,
            reader,
            uploader,
            delay,
        }
    }

    pub(crate) fn delay(&self) -> &UploadDelay {
        &self.delay
    }

    /// Uploads the oldest readable batch, if any. Returns the outcome, or `None` when there was
    /// nothing to send.
    pub(crate) async fn run_upload_cycle(&mut self) -> Option<UploadStatus> {
        let batch = match self.reader.read_next_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => return None,
            Err(err) => {
                log::error!("{}: failed to read next batch: {err}", self.feature);
                return None;
            }
        };

        let status = self.uploader.upload(&batch).await;
        let delete = !status.should_retry();
        if let Err(err) = self.reader.release_batch(&batch, delete) {
            log::error!(
                "{}: failed to release batch {}: {err}",
                self.feature,
                batch.id()
            );
        }
        self.delay.record(status);
        log::debug!(
            "{}: next upload in {} ms",
            self.feature,
            self.delay.current().as_millis()
        );
        Some(status)
    }
}

#[async_trait]
impl WorkerTask for UploadTask {
    type Message = UploadCommand;

    async fn on_message(&mut self, message: UploadCommand) -> Option<Duration> {
        match message {
            UploadCommand::Flush => {
                self.run_upload_cycle().await;
            }
        }
        Some(self.delay.current())
    }

    async fn on_idle(&mut self) -> Option<Duration> {
        self.run_upload_cycle().await;
        Some(self.delay.current())
    }
}

/// Periodic upload loop of one feature, pinned to its own worker so at most one upload is in
/// flight per feature.
pub struct UploadScheduler {
    feature: Feature,
    worker: Option<SingleWorker<UploadCommand>>,
}

impl std::fmt::Debug for UploadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("feature", &self.feature)
            .field("running", &self.is_running())
            .finish()
    }
}

impl UploadScheduler {
    pub fn start(
        feature: Feature,
        reader: Arc<BatchReader>,
        uploader: Arc<dyn DataUploader>,
        delay: UploadDelay,
    ) -> Self {
        let first_tick = delay.current();
        let task = UploadTask::new(feature, reader, uploader, delay);
        match SingleWorker::spawn(format!("rum-sdk-upload-{feature}"), 8, Some(first_tick), task) {
            Ok(worker) => Self {
                feature,
                worker: Some(worker),
            },
            Err(err) => {
                log::error!("{feature}: could not start upload worker: {err}");
                Self::disabled(feature)
            }
        }
    }

    /// Scheduler that never uploads; batches stay on disk until the next start.
    pub fn disabled(feature: Feature) -> Self {
        Self {
            feature,
            worker: None,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_shut_down())
    }

    /// Runs an upload cycle now instead of waiting for the next tick.
    pub fn flush(&self) {
        if let Some(worker) = &self.worker {
            worker.submit(UploadCommand::Flush);
        }
    }

    pub fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.shutdown();
        }
    }
}
