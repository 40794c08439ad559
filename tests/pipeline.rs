use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use rum_rs_sdk::core::{Configuration, Feature, RumConfiguration, SdkContext, TrackingConsent};
use rum_rs_sdk::persistence::PersistenceConfig;
use rum_rs_sdk::rum::{Attributes, RumActionType};

fn start_mock_server() -> Option<MockServer> {
    panic::catch_unwind(AssertUnwindSafe(MockServer::start)).ok()
}

fn unique_dir(prefix: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "rum-sdk-it-{prefix}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn config(server: &MockServer, root: &Path) -> Configuration {
    Configuration::new("pub-token", "integration")
        .with_site(server.base_url())
        .with_storage_dir(root)
        .with_upload_enabled(true)
        .with_upload_frequency(Duration::from_millis(50))
        .with_max_upload_delay(Duration::from_millis(400))
        .with_request_timeout(Duration::from_secs(5))
        .with_persistence(PersistenceConfig::default().with_recent_delay(Duration::from_millis(50)))
        .with_logs_enabled(false)
        .with_crash_reports_enabled(false)
        .with_rum(RumConfiguration::new("integration-app"))
}

fn record_session(sdk: &SdkContext) {
    let monitor = sdk.rum_monitor().expect("RUM enabled");
    monitor.start_view("home", "Home", Attributes::new());
    monitor.add_action(RumActionType::Custom, "open_cart", Attributes::new());
    monitor.stop_view("home", Attributes::new());
    assert!(monitor.drain());
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

fn batch_files(root: &Path, feature: Feature) -> usize {
    fs::read_dir(root.join(feature.granted_dir_name()))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[test]
fn recorded_events_are_uploaded_and_deleted() {
    let Some(server) = start_mock_server() else {
        eprintln!("Skipping recorded_events_are_uploaded_and_deleted: unable to start mock server");
        return;
    };
    let intake = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v2/rum")
            .query_param("source", "android")
            .header("x-client-token", "pub-token")
            .header("content-type", "text/plain;charset=UTF-8");
        then.status(202);
    });
    let root = unique_dir("upload");
    let sdk = SdkContext::initialize(config(&server, &root), TrackingConsent::Granted).unwrap();

    record_session(&sdk);

    assert!(wait_until(|| intake.hits() >= 1), "no batch uploaded");
    assert!(wait_until(|| batch_files(&root, Feature::Rum) == 0));
    sdk.flush_and_shutdown();
}

#[test]
fn server_errors_keep_batches_on_disk() {
    let Some(server) = start_mock_server() else {
        eprintln!("Skipping server_errors_keep_batches_on_disk: unable to start mock server");
        return;
    };
    let intake = server.mock(|when, then| {
        when.method(POST).path("/api/v2/rum");
        then.status(503);
    });
    let root = unique_dir("retry");
    let sdk = SdkContext::initialize(config(&server, &root), TrackingConsent::Granted).unwrap();

    record_session(&sdk);

    assert!(wait_until(|| intake.hits() >= 2), "upload was not retried");
    sdk.flush_and_shutdown();
    assert!(batch_files(&root, Feature::Rum) >= 1);
}

#[test]
fn pending_consent_holds_uploads_until_granted() {
    let Some(server) = start_mock_server() else {
        eprintln!("Skipping pending_consent_holds_uploads_until_granted: unable to start mock server");
        return;
    };
    let intake = server.mock(|when, then| {
        when.method(POST).path("/api/v2/rum");
        then.status(200);
    });
    let root = unique_dir("consent");
    let sdk = SdkContext::initialize(config(&server, &root), TrackingConsent::Pending).unwrap();

    record_session(&sdk);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(intake.hits(), 0);

    sdk.set_tracking_consent(TrackingConsent::Granted);
    assert!(wait_until(|| intake.hits() >= 1), "granted batch never uploaded");
    sdk.flush_and_shutdown();
}
