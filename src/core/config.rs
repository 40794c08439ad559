use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{invalid_configuration, SdkResult};
use crate::persistence::PersistenceConfig;
use crate::rum::constants::{
    DEFAULT_ACTION_INACTIVITY, DEFAULT_ACTION_MAX_DURATION, DEFAULT_FROZEN_FRAME_THRESHOLD,
    DEFAULT_KEEP_ALIVE, DEFAULT_ONGOING_RESOURCE_TTL, DEFAULT_SAMPLE_RATE,
    DEFAULT_SESSION_INACTIVITY, DEFAULT_SESSION_MAX_DURATION,
};

pub const DEFAULT_SITE: &str = "https://browser-intake.example-telemetry.com";
pub const DEFAULT_SOURCE: &str = "android";
pub const DEFAULT_UPLOAD_FREQUENCY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_UPLOAD_DELAY: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(45);
pub const MAX_ENV_LENGTH: usize = 196;

const STORAGE_DIR_ENV: &str = "RUM_SDK_STORAGE_DIR";
const SITE_ENV: &str = "RUM_SDK_SITE";
const DISABLE_UPLOAD_ENV: &str = "RUM_SDK_DISABLE_UPLOAD";

/// Everything the SDK needs to start. Built with the `with_*` setters and checked by
/// [`Configuration::validate`] when the context is initialized.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub client_token: String,
    pub env: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub source: String,
    pub site: String,
    pub storage_dir: PathBuf,
    /// Debug builds fail fast on configuration mistakes instead of disabling features.
    pub debug: bool,
    pub upload_enabled: bool,
    pub upload_frequency: Duration,
    pub max_upload_delay: Duration,
    pub request_timeout: Duration,
    pub persistence: PersistenceConfig,
    pub rum: Option<RumConfiguration>,
    pub logs_enabled: bool,
    pub tracing_enabled: bool,
    pub crash_reports_enabled: bool,
    pub first_party_hosts: Vec<String>,
}

impl Configuration {
    pub fn new(client_token: impl Into<String>, env: impl Into<String>) -> Self {
        let storage_dir = std::env::var(STORAGE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("rum-sdk"));
        let site = std::env::var(SITE_ENV).unwrap_or_else(|_| DEFAULT_SITE.to_string());
        Self {
            client_token: client_token.into(),
            env: env.into(),
            service: None,
            version: None,
            source: DEFAULT_SOURCE.to_string(),
            site,
            storage_dir,
            debug: cfg!(debug_assertions),
            upload_enabled: std::env::var(DISABLE_UPLOAD_ENV).is_err(),
            upload_frequency: DEFAULT_UPLOAD_FREQUENCY,
            max_upload_delay: DEFAULT_MAX_UPLOAD_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            persistence: PersistenceConfig::default(),
            rum: None,
            logs_enabled: true,
            tracing_enabled: false,
            crash_reports_enabled: true,
            first_party_hosts: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_upload_enabled(mut self, enabled: bool) -> Self {
        self.upload_enabled = enabled;
        self
    }

    pub fn with_upload_frequency(mut self, frequency: Duration) -> Self {
        self.upload_frequency = frequency;
        self
    }

    pub fn with_max_upload_delay(mut self, delay: Duration) -> Self {
        self.max_upload_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_rum(mut self, rum: RumConfiguration) -> Self {
        self.rum = Some(rum);
        self
    }

    pub fn with_logs_enabled(mut self, enabled: bool) -> Self {
        self.logs_enabled = enabled;
        self
    }

    pub fn with_tracing_enabled(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn with_crash_reports_enabled(mut self, enabled: bool) -> Self {
        self.crash_reports_enabled = enabled;
        self
    }

    pub fn with_first_party_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.first_party_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the settings that make the whole SDK unusable when wrong.
    pub fn validate(&self) -> SdkResult<()> {
        if self.client_token.trim().is_empty() {
            return Err(invalid_configuration("client token must not be empty"));
        }
        validate_env(&self.env)?;
        if url::Url::parse(&self.site).is_err() {
            return Err(invalid_configuration(format!(
                "site \"{}\" is not a valid URL",
                self.site
            )));
        }
        if self.upload_frequency.is_zero() {
            return Err(invalid_configuration("upload frequency must be positive"));
        }
        Ok(())
    }
}

fn validate_env(env: &str) -> SdkResult<()> {
    let valid_chars = env
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_:./-".contains(c));
    if env.is_empty() || env.len() > MAX_ENV_LENGTH || !valid_chars {
        return Err(invalid_configuration(format!(
            "environment name \"{env}\" must be 1 to {MAX_ENV_LENGTH} characters of [a-z0-9_:./-]"
        )));
    }
    Ok(())
}

/// RUM feature settings. Every threshold of the scope tree is read from here.
#[derive(Clone, Debug, PartialEq)]
pub struct RumConfiguration {
    pub application_id: String,
    /// Percentage of sessions kept, from 0 to 100.
    pub sample_rate: f32,
    pub session_inactivity: Duration,
    pub session_max_duration: Duration,
    pub keep_alive: Duration,
    pub action_inactivity: Duration,
    pub action_max_duration: Duration,
    /// Age after which an unfinished resource no longer keeps its action open.
    pub ongoing_resource_ttl: Duration,
    pub frozen_frame_threshold: Duration,
}

impl RumConfiguration {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            session_inactivity: DEFAULT_SESSION_INACTIVITY,
            session_max_duration: DEFAULT_SESSION_MAX_DURATION,
            keep_alive: DEFAULT_KEEP_ALIVE,
            action_inactivity: DEFAULT_ACTION_INACTIVITY,
            action_max_duration: DEFAULT_ACTION_MAX_DURATION,
            ongoing_resource_ttl: DEFAULT_ONGOING_RESOURCE_TTL,
            frozen_frame_threshold: DEFAULT_FROZEN_FRAME_THRESHOLD,
        }
    }

    pub fn with_sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_session_inactivity(mut self, timeout: Duration) -> Self {
        self.session_inactivity = timeout;
        self
    }

    pub fn with_session_max_duration(mut self, duration: Duration) -> Self {
        self.session_max_duration = duration;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn with_action_inactivity(mut self, threshold: Duration) -> Self {
        self.action_inactivity = threshold;
        self
    }

    pub fn with_action_max_duration(mut self, duration: Duration) -> Self {
        self.action_max_duration = duration;
        self
    }

    pub fn with_ongoing_resource_ttl(mut self, ttl: Duration) -> Self {
        self.ongoing_resource_ttl = ttl;
        self
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.application_id.trim().is_empty() {
            return Err(invalid_configuration(
                "RUM requires a non-empty application id",
            ));
        }
        if !(0.0..=100.0).contains(&self.sample_rate) || self.sample_rate.is_nan() {
            return Err(invalid_configuration(format!(
                "RUM sample rate {} must be between 0 and 100",
                self.sample_rate
            )));
        }
        if self.keep_alive.is_zero() {
            return Err(invalid_configuration("RUM keep-alive must be positive"));
        }
        Ok(())
    }
}
