use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::user_info::UserInfoProvider;
use crate::core::SDK_VERSION;
use crate::logs::model::{LogErrorInfo, LogEvent, LogStatus, LoggerInfo};
use crate::persistence::DataWriter;
use crate::platform::time::TimeProvider;
use crate::rum::{Attributes, RumMonitor};

const DEFAULT_LOGGER_NAME: &str = "rum-sdk-logs";
const CRASH_LOGGER_NAME: &str = "crash";

/// Identity stamped on every log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogsSettings {
    pub service: String,
    pub env: String,
    pub version: Option<String>,
    pub logger_name: String,
}

impl LogsSettings {
    pub fn new(service: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            env: env.into(),
            version: None,
            logger_name: DEFAULT_LOGGER_NAME.to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    fn tags(&self) -> String {
        match &self.version {
            Some(version) => format!("env:{},version:{version}", self.env),
            None => format!("env:{}", self.env),
        }
    }
}

/// Writes log entries. Ordinary entries go through the Logs feature and are persisted on its
/// worker; crash entries go through the Crash feature and are persisted before returning.
#[derive(Clone)]
pub struct LogsHandle {
    inner: Arc<LogsInner>,
}

struct LogsInner {
    settings: LogsSettings,
    writer: Arc<dyn DataWriter<LogEvent>>,
    crash_writer: Arc<dyn DataWriter<LogEvent>>,
    user_info: Arc<UserInfoProvider>,
    time: Arc<dyn TimeProvider>,
    rum: RwLock<Option<Arc<RumMonitor>>>,
}

impl fmt::Debug for LogsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogsHandle")
            .field("service", &self.inner.settings.service)
            .field("logger", &self.inner.settings.logger_name)
            .finish()
    }
}

impl LogsHandle {
    pub fn new(
        settings: LogsSettings,
        writer: Arc<dyn DataWriter<LogEvent>>,
        crash_writer: Arc<dyn DataWriter<LogEvent>>,
        user_info: Arc<UserInfoProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(LogsInner {
                settings,
                writer,
                crash_writer,
                user_info,
                time,
                rum: RwLock::new(None),
            }),
        }
    }

    /// Links entries to the RUM view on screen when they are created.
    pub fn bind_rum(&self, monitor: Arc<RumMonitor>) {
        *self
            .inner
            .rum
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(monitor);
    }

    pub fn log(&self, status: LogStatus, message: impl Into<String>, attributes: Attributes) {
        let event = self.build(status, message.into(), None, attributes, None);
        self.inner.writer.write(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogStatus::Debug, message, Attributes::new());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogStatus::Info, message, Attributes::new());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogStatus::Warn, message, Attributes::new());
    }

    /// Logs an error entry carrying the error's kind and stack.
    pub fn error(
        &self,
        message: impl Into<String>,
        kind: Option<String>,
        stack: Option<String>,
        attributes: Attributes,
    ) {
        let message = message.into();
        let error = LogErrorInfo {
            kind,
            message: message.clone(),
            stack,
        };
        let event = self.build(LogStatus::Error, message, Some(error), attributes, None);
        self.inner.writer.write(event);
    }

    /// Persists a crash report on the calling thread. Returns whether it reached the disk.
    pub fn write_crash_now(
        &self,
        message: impl Into<String>,
        kind: impl Into<String>,
        stack: Option<String>,
    ) -> bool {
        let message = message.into();
        let error = LogErrorInfo {
            kind: Some(kind.into()),
            message: message.clone(),
            stack,
        };
        let event = self.build(
            LogStatus::Emergency,
            message,
            Some(error),
            Attributes::new(),
            Some(CRASH_LOGGER_NAME),
        );
        self.inner.crash_writer.write_immediately(event)
    }

    fn build(
        &self,
        status: LogStatus,
        message: String,
        error: Option<LogErrorInfo>,
        attributes: Attributes,
        logger_name: Option<&str>,
    ) -> LogEvent {
        let settings = &self.inner.settings;
        let date = DateTime::<Utc>::from_timestamp_millis(self.inner.time.wall_clock_ms())
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let rum = self
            .inner
            .rum
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|monitor| monitor.current_context());

        LogEvent {
            date,
            status,
            message,
            service: settings.service.clone(),
            ddtags: settings.tags(),
            logger: LoggerInfo {
                name: logger_name.unwrap_or(&settings.logger_name).to_string(),
                thread_name: std::thread::current().name().map(str::to_string),
                version: SDK_VERSION.to_string(),
            },
            error,
            usr: self.inner.user_info.snapshot(),
            application_id: rum.as_ref().map(|ctx| ctx.application_id.clone()),
            session_id: rum.as_ref().and_then(|ctx| ctx.session_id.clone()),
            view_id: rum.and_then(|ctx| ctx.view_id),
            attributes,
        }
    }
}
