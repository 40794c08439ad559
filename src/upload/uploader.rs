use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};

use crate::core::error::{internal_error, invalid_configuration, SdkResult};
use crate::core::feature::Feature;
use crate::core::SDK_VERSION;
use crate::logger::SDK_LOGGER;
use crate::persistence::Batch;

const CLIENT_TOKEN_HEADER: &str = "x-client-token";
const REQUEST_ID_HEADER: &str = "x-request-id";
const SDK_VERSION_HEADER: &str = "x-sdk-version";

/// Outcome of one batch upload. The response status is the only feedback channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Success(u16),
    NetworkError,
    HttpRedirection(u16),
    HttpClientError(u16),
    HttpClientRateLimiting(u16),
    InvalidTokenError(u16),
    HttpServerError(u16),
    UnknownError(u16),
}

impl UploadStatus {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=299 => UploadStatus::Success(code),
            300..=399 => UploadStatus::HttpRedirection(code),
            401 | 403 => UploadStatus::InvalidTokenError(code),
            429 => UploadStatus::HttpClientRateLimiting(code),
            400..=499 => UploadStatus::HttpClientError(code),
            500..=599 => UploadStatus::HttpServerError(code),
            _ => UploadStatus::UnknownError(code),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadStatus::Success(_))
    }

    /// Retryable outcomes keep the batch on disk; every other failure drops it so an
    /// unsendable payload cannot wedge the pipeline.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            UploadStatus::NetworkError
                | UploadStatus::HttpServerError(_)
                | UploadStatus::HttpClientRateLimiting(_)
        )
    }

    pub fn code(&self) -> Option<u16> {
        match *self {
            UploadStatus::NetworkError => None,
            UploadStatus::Success(code)
            | UploadStatus::HttpRedirection(code)
            | UploadStatus::HttpClientError(code)
            | UploadStatus::HttpClientRateLimiting(code)
            | UploadStatus::InvalidTokenError(code)
            | UploadStatus::HttpServerError(code)
            | UploadStatus::UnknownError(code) => Some(code),
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Success(_) => "success",
            UploadStatus::NetworkError => "network error",
            UploadStatus::HttpRedirection(_) => "redirection",
            UploadStatus::HttpClientError(_) => "client error",
            UploadStatus::HttpClientRateLimiting(_) => "rate limited",
            UploadStatus::InvalidTokenError(_) => "invalid client token",
            UploadStatus::HttpServerError(_) => "server error",
            UploadStatus::UnknownError(_) => "unknown error",
        };
        match self.code() {
            Some(code) => write!(f, "{label} ({code})"),
            None => f.write_str(label),
        }
    }
}

#[async_trait]
pub trait DataUploader: Send + Sync {
    async fn upload(&self, batch: &Batch) -> UploadStatus;
}

/// Sends one POST per batch to the feature's intake endpoint. The body is the batch file as
/// stored: obfuscated records, each followed by the record separator.
#[derive(Clone, Debug)]
pub struct HttpUploader {
    feature: Feature,
    client: Client,
    endpoint: Url,
    client_token: String,
}

impl HttpUploader {
    pub fn new(
        feature: Feature,
        site: &str,
        client_token: &str,
        source: &str,
        timeout: Duration,
    ) -> SdkResult<Self> {
        let mut endpoint = Url::parse(site).map_err(|err| {
            invalid_configuration(format!("Invalid intake site '{}': {}", site, err))
        })?;
        endpoint.set_path(feature.intake_path());
        endpoint.query_pairs_mut().append_pair("source", source);

        let client = Client::builder()
            .user_agent(format!("rum-rs-sdk/{SDK_VERSION}"))
            .timeout(timeout)
            .build()
            .map_err(|err| internal_error(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            feature,
            client,
            endpoint,
            client_token: client_token.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn headers(&self) -> Option<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain;charset=UTF-8"),
        );
        headers.insert(
            HeaderName::from_static(CLIENT_TOKEN_HEADER),
            HeaderValue::from_str(&self.client_token).ok()?,
        );
        headers.insert(
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok()?,
        );
        headers.insert(
            HeaderName::from_static(SDK_VERSION_HEADER),
            HeaderValue::from_static(SDK_VERSION),
        );
        Some(headers)
    }
}

#[async_trait]
impl DataUploader for HttpUploader {
    async fn upload(&self, batch: &Batch) -> UploadStatus {
        let Some(headers) = self.headers() else {
            SDK_LOGGER.error("The client token contains characters not allowed in a header");
            return UploadStatus::InvalidTokenError(0);
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(batch.data.clone())
            .send()
            .await;

        let status = match response {
            Ok(response) => UploadStatus::from_status_code(response.status().as_u16()),
            Err(err) => {
                log::debug!("{}: batch {} upload failed: {err}", self.feature, batch.id());
                UploadStatus::NetworkError
            }
        };
        report(self.feature, batch, status);
        status
    }
}

fn report(feature: Feature, batch: &Batch, status: UploadStatus) {
    let size = batch.data.len();
    match status {
        UploadStatus::Success(_) => {
            log::debug!("{feature}: batch {} ({size} bytes) sent", batch.id())
        }
        UploadStatus::InvalidTokenError(_) => SDK_LOGGER.error(format!(
            "{feature}: batch rejected, make sure the client token is valid"
        )),
        UploadStatus::HttpClientError(code) | UploadStatus::HttpRedirection(code) => {
            log::error!("{feature}: batch {} dropped after status {code}", batch.id())
        }
        status if status.should_retry() => {
            log::warn!("{feature}: batch {} will be retried: {status}", batch.id())
        }
        status => log::error!("{feature}: batch {} dropped: {status}", batch.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consent::TrackingConsent;
    use crate::persistence::encoding::encode_record;
    use crate::persistence::{BatchReader, ConsentAwareStorage, PersistenceConfig};
    use crate::test_support::{start_mock_server, unique_dir, ManualTimeProvider};
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};

    fn batch_with(records: &[&[u8]]) -> Batch {
        let time = Arc::new(ManualTimeProvider::new(1_000));
        let storage = Arc::new(Mutex::new(ConsentAwareStorage::new(
            Feature::Logs,
            &unique_dir("uploader"),
            PersistenceConfig::default(),
            time.clone(),
        )));
        let mut body = Vec::new();
        for record in records {
            body.extend(encode_record(record));
        }
        let path = storage
            .lock()
            .unwrap()
            .writable_file(TrackingConsent::Granted, body.len() as u64)
            .unwrap()
            .unwrap();
        std::fs::write(path, &body).unwrap();
        time.advance(Duration::from_secs(10));
        BatchReader::new(storage).read_next_batch().unwrap().unwrap()
    }

    #[test]
    fn status_codes_map_to_retry_decisions() {
        assert!(UploadStatus::from_status_code(202).is_success());
        assert!(UploadStatus::from_status_code(500).should_retry());
        assert!(UploadStatus::from_status_code(503).should_retry());
        assert!(UploadStatus::from_status_code(429).should_retry());
        assert!(!UploadStatus::from_status_code(408).should_retry());
        assert_eq!(
            UploadStatus::from_status_code(408),
            UploadStatus::HttpClientError(408)
        );
        assert!(!UploadStatus::from_status_code(400).should_retry());
        assert!(!UploadStatus::from_status_code(413).should_retry());
        assert_eq!(
            UploadStatus::from_status_code(403),
            UploadStatus::InvalidTokenError(403)
        );
        assert!(!UploadStatus::from_status_code(302).should_retry());
        assert!(!UploadStatus::from_status_code(600).should_retry());
        assert!(UploadStatus::NetworkError.should_retry());
    }

    #[test]
    fn endpoint_includes_feature_path_and_source() {
        let uploader = HttpUploader::new(
            Feature::Rum,
            "https://intake.example.com",
            "token",
            "android",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            uploader.endpoint().as_str(),
            "https://intake.example.com/api/v2/rum?source=android"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn posts_batch_body_with_headers() {
        let Some(server) = start_mock_server() else {
            eprintln!("Skipping posts_batch_body_with_headers: unable to start mock server");
            return;
        };
        let batch = batch_with(&[b"first", b"second"]);
        let expected_body = String::from_utf8(batch.data.to_vec()).unwrap();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/logs")
                .query_param("source", "android")
                .header("x-client-token", "token")
                .header_exists("x-request-id")
                .body(expected_body.clone());
            then.status(202);
        });

        let uploader = HttpUploader::new(
            Feature::Logs,
            &server.base_url(),
            "token",
            "android",
            Duration::from_secs(5),
        )
        .unwrap();
        let status = uploader.upload(&batch).await;

        mock.assert();
        assert_eq!(status, UploadStatus::Success(202));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn classifies_server_responses() {
        let Some(server) = start_mock_server() else {
            eprintln!("Skipping classifies_server_responses: unable to start mock server");
            return;
        };
        let batch = batch_with(&[b"record"]);
        for (path_feature, code, expected) in [
            (Feature::Logs, 500, UploadStatus::HttpServerError(500)),
            (Feature::Rum, 400, UploadStatus::HttpClientError(400)),
            (Feature::Tracing, 429, UploadStatus::HttpClientRateLimiting(429)),
        ] {
            server.mock(|when, then| {
                when.method(POST).path(path_feature.intake_path());
                then.status(code);
            });
            let uploader = HttpUploader::new(
                path_feature,
                &server.base_url(),
                "token",
                "android",
                Duration::from_secs(5),
            )
            .unwrap();
            assert_eq!(uploader.upload(&batch).await, expected);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_host_is_a_network_error() {
        let batch = batch_with(&[b"record"]);
        let uploader = HttpUploader::new(
            Feature::Logs,
            "http://127.0.0.1:9",
            "token",
            "android",
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(uploader.upload(&batch).await, UploadStatus::NetworkError);
    }
}
