use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::core::config::Configuration;
use crate::core::consent::{TrackingConsent, TrackingConsentProvider};
use crate::core::error::SdkResult;
use crate::core::feature::Feature;
use crate::core::first_party::FirstPartyHostDetector;
use crate::core::user_info::{UserInfo, UserInfoProvider};
use crate::crash::{install_crash_handler, CrashReporter};
use crate::logger::SDK_LOGGER;
use crate::logs::{LogEvent, LogsHandle, LogsSettings};
use crate::persistence::{
    BatchReader, ConsentAwareStorage, DataWriter, FeatureWriter, NoOpWriter, SharedStorage,
};
use crate::platform::time::{SystemTimeProvider, TimeProvider};
use crate::rum::{RumEvent, RumMonitor};
use crate::upload::{HttpUploader, UploadDelay, UploadScheduler};

/// Lifecycle calls the context fans out to every feature, whatever its event type.
trait PipelineControl: Send + Sync {
    fn on_consent_changed(&self, previous: TrackingConsent, current: TrackingConsent);

    fn flush(&self);

    fn shutdown(&self);
}

/// Storage, writer and upload loop of one feature.
pub struct FeaturePipeline<T> {
    feature: Feature,
    storage: SharedStorage,
    writer: Arc<FeatureWriter<T>>,
    scheduler: UploadScheduler,
}

impl<T> std::fmt::Debug for FeaturePipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePipeline")
            .field("feature", &self.feature)
            .field("writer", &self.writer)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<T> FeaturePipeline<T>
where
    T: Serialize + Send + 'static,
{
    fn start(
        feature: Feature,
        config: &Configuration,
        consent: &Arc<TrackingConsentProvider>,
        time: &Arc<dyn TimeProvider>,
    ) -> Self {
        let storage: SharedStorage = Arc::new(Mutex::new(ConsentAwareStorage::new(
            feature,
            &config.storage_dir,
            config.persistence.clone(),
            Arc::clone(time),
        )));
        let writer = Arc::new(FeatureWriter::new(
            Arc::clone(&storage),
            Arc::clone(consent),
        ));
        let scheduler = start_scheduler(feature, config, &storage);
        log::debug!("{feature}: pipeline started");
        Self {
            feature,
            storage,
            writer,
            scheduler,
        }
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn writer(&self) -> Arc<FeatureWriter<T>> {
        Arc::clone(&self.writer)
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }
}

impl<T> PipelineControl for FeaturePipeline<T>
where
    T: Serialize + Send + 'static,
{
    fn on_consent_changed(&self, previous: TrackingConsent, current: TrackingConsent) {
        self.writer.on_consent_changed(previous, current);
    }

    fn flush(&self) {
        self.scheduler.flush();
    }

    fn shutdown(&self) {
        self.writer.shutdown();
        self.scheduler.flush();
        self.scheduler.shutdown();
    }
}

fn start_scheduler(
    feature: Feature,
    config: &Configuration,
    storage: &SharedStorage,
) -> UploadScheduler {
    if !config.upload_enabled {
        log::info!("{feature}: uploads disabled, batches stay on disk");
        return UploadScheduler::disabled(feature);
    }
    let uploader = match HttpUploader::new(
        feature,
        &config.site,
        &config.client_token,
        &config.source,
        config.request_timeout,
    ) {
        Ok(uploader) => uploader,
        Err(err) => {
            SDK_LOGGER.error(format!("{feature} data will not be uploaded: {err}"));
            return UploadScheduler::disabled(feature);
        }
    };
    UploadScheduler::start(
        feature,
        Arc::new(BatchReader::new(Arc::clone(storage))),
        Arc::new(uploader),
        UploadDelay::new(config.upload_frequency, config.max_upload_delay),
    )
}

/// Process-wide state of the SDK, created once by [`SdkContext::initialize`] and passed to
/// whatever needs it.
///
/// Each enabled feature gets its own [`FeaturePipeline`]. Disabled features get writers that
/// discard everything, so callers never need to check what is enabled.
pub struct SdkContext {
    config: Configuration,
    consent: Arc<TrackingConsentProvider>,
    user_info: Arc<UserInfoProvider>,
    rum_pipeline: Option<FeaturePipeline<RumEvent>>,
    logs_pipeline: Option<FeaturePipeline<LogEvent>>,
    crash_pipeline: Option<FeaturePipeline<LogEvent>>,
    trace_pipeline: Option<FeaturePipeline<Value>>,
    rum_monitor: Option<Arc<RumMonitor>>,
    logs: LogsHandle,
    trace_writer: Arc<dyn DataWriter<Value>>,
    active: bool,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for SdkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkContext")
            .field("env", &self.config.env)
            .field("active", &self.active)
            .field("consent", &self.consent.consent())
            .field("rum", &self.rum_monitor.is_some())
            .finish()
    }
}

impl SdkContext {
    /// Validates `config` and starts every enabled feature.
    ///
    /// With `config.debug` set, configuration mistakes are returned as errors. Otherwise they are
    /// reported on the developer log: an unusable core configuration yields an inactive context
    /// and an invalid RUM configuration disables RUM alone.
    pub fn initialize(config: Configuration, consent: TrackingConsent) -> SdkResult<Self> {
        Self::initialize_with_time(config, consent, Arc::new(SystemTimeProvider))
    }

    pub fn initialize_with_time(
        mut config: Configuration,
        consent: TrackingConsent,
        time: Arc<dyn TimeProvider>,
    ) -> SdkResult<Self> {
        let consent = Arc::new(TrackingConsentProvider::new(consent));
        let user_info = Arc::new(UserInfoProvider::new());

        if let Err(err) = config.validate() {
            if config.debug {
                return Err(err);
            }
            SDK_LOGGER.error(format!("SDK not started: {err}"));
            return Ok(Self::inactive(config, consent, user_info, time));
        }
        if let Some(Err(err)) = config.rum.as_ref().map(|rum| rum.validate()) {
            if config.debug {
                return Err(err);
            }
            SDK_LOGGER.warn(format!("RUM disabled: {err}"));
            config.rum = None;
        }

        let rum_pipeline = config
            .rum
            .as_ref()
            .map(|_| FeaturePipeline::<RumEvent>::start(Feature::Rum, &config, &consent, &time));
        let logs_pipeline = config
            .logs_enabled
            .then(|| FeaturePipeline::<LogEvent>::start(Feature::Logs, &config, &consent, &time));
        let crash_pipeline = config.crash_reports_enabled.then(|| {
            FeaturePipeline::<LogEvent>::start(Feature::Crash, &config, &consent, &time)
        });
        let trace_pipeline = config
            .tracing_enabled
            .then(|| FeaturePipeline::<Value>::start(Feature::Tracing, &config, &consent, &time));

        let rum_monitor = match (&config.rum, &rum_pipeline) {
            (Some(rum), Some(pipeline)) => Some(Arc::new(RumMonitor::new(
                rum.clone(),
                pipeline.writer(),
                Arc::clone(&user_info),
                FirstPartyHostDetector::new(&config.first_party_hosts),
                Arc::clone(&time),
            ))),
            _ => None,
        };

        let logs = LogsHandle::new(
            logs_settings(&config),
            writer_or_noop(&logs_pipeline),
            writer_or_noop(&crash_pipeline),
            Arc::clone(&user_info),
            time,
        );
        if let Some(monitor) = &rum_monitor {
            logs.bind_rum(Arc::clone(monitor));
        }
        let trace_writer = writer_or_noop(&trace_pipeline);

        log::info!(
            "SDK started for env {} with consent {}",
            config.env,
            consent.consent()
        );
        Ok(Self {
            config,
            consent,
            user_info,
            rum_pipeline,
            logs_pipeline,
            crash_pipeline,
            trace_pipeline,
            rum_monitor,
            logs,
            trace_writer,
            active: true,
            shut_down: AtomicBool::new(false),
        })
    }

    fn inactive(
        config: Configuration,
        consent: Arc<TrackingConsentProvider>,
        user_info: Arc<UserInfoProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let logs = LogsHandle::new(
            logs_settings(&config),
            Arc::new(NoOpWriter),
            Arc::new(NoOpWriter),
            Arc::clone(&user_info),
            time,
        );
        Self {
            config,
            consent,
            user_info,
            rum_pipeline: None,
            logs_pipeline: None,
            crash_pipeline: None,
            trace_pipeline: None,
            rum_monitor: None,
            logs,
            trace_writer: Arc::new(NoOpWriter),
            active: false,
            shut_down: AtomicBool::new(false),
        }
    }

    /// `false` when the configuration was rejected and nothing is collected.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn tracking_consent(&self) -> TrackingConsent {
        self.consent.consent()
    }

    /// Updates the consent and lets every feature migrate or wipe its pending data. The
    /// migration is queued behind the writes already accepted.
    pub fn set_tracking_consent(&self, consent: TrackingConsent) {
        let previous = self.consent.set_consent(consent);
        if previous == consent {
            return;
        }
        log::debug!("tracking consent changed from {previous} to {consent}");
        for pipeline in self.pipelines() {
            pipeline.on_consent_changed(previous, consent);
        }
    }

    pub fn set_user_info(&self, info: UserInfo) {
        self.user_info.set_user_info(info);
    }

    pub fn rum_monitor(&self) -> Option<&Arc<RumMonitor>> {
        self.rum_monitor.as_ref()
    }

    pub fn logs(&self) -> &LogsHandle {
        &self.logs
    }

    /// Writer for spans produced by an external tracer. Discards everything when tracing is
    /// disabled.
    pub fn trace_writer(&self) -> Arc<dyn DataWriter<Value>> {
        Arc::clone(&self.trace_writer)
    }

    pub fn rum_pipeline(&self) -> Option<&FeaturePipeline<RumEvent>> {
        self.rum_pipeline.as_ref()
    }

    pub fn logs_pipeline(&self) -> Option<&FeaturePipeline<LogEvent>> {
        self.logs_pipeline.as_ref()
    }

    /// Installs the panic hook reporting crashes. Does nothing when crash reporting is
    /// disabled.
    pub fn install_crash_handler(&self) {
        if !self.active || !self.config.crash_reports_enabled {
            SDK_LOGGER.warn("crash reporting is disabled, no crash handler installed");
            return;
        }
        install_crash_handler(CrashReporter::new(
            Some(self.logs.clone()),
            self.rum_monitor.clone(),
        ));
    }

    /// Asks every feature to upload a batch now.
    pub fn flush(&self) {
        for pipeline in self.pipelines() {
            pipeline.flush();
        }
    }

    /// Processes every pending RUM event, persists every queued write, runs one last upload
    /// cycle per feature and stops all workers. Later calls do nothing.
    pub fn flush_and_shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let started = std::time::Instant::now();
        if let Some(monitor) = &self.rum_monitor {
            monitor.shutdown();
        }
        for pipeline in self.pipelines() {
            pipeline.shutdown();
        }
        log::debug!("SDK shut down in {:?}", started.elapsed());
    }

    fn pipelines(&self) -> Vec<&dyn PipelineControl> {
        let mut pipelines: Vec<&dyn PipelineControl> = Vec::with_capacity(Feature::ALL.len());
        if let Some(pipeline) = &self.rum_pipeline {
            pipelines.push(pipeline);
        }
        if let Some(pipeline) = &self.logs_pipeline {
            pipelines.push(pipeline);
        }
        if let Some(pipeline) = &self.crash_pipeline {
            pipelines.push(pipeline);
        }
        if let Some(pipeline) = &self.trace_pipeline {
            pipelines.push(pipeline);
        }
        pipelines
    }
}

fn logs_settings(config: &Configuration) -> LogsSettings {
    let service = config
        .service
        .clone()
        .unwrap_or_else(|| "rum-sdk".to_string());
    let settings = LogsSettings::new(service, config.env.clone());
    match &config.version {
        Some(version) => settings.with_version(version.clone()),
        None => settings,
    }
}

fn writer_or_noop<T>(pipeline: &Option<FeaturePipeline<T>>) -> Arc<dyn DataWriter<T>>
where
    T: Serialize + Send + 'static,
{
    match pipeline {
        Some(pipeline) => pipeline.writer(),
        None => Arc::new(NoOpWriter),
    }
}
