//! Test utilities shared across crate-level unit tests.

pub mod http;

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::persistence::DataWriter;
use crate::platform::time::{Time, TimeProvider};

pub use http::start_mock_server;

/// Fresh directory path under the system temp dir. The directory itself is not created.
pub fn unique_dir(prefix: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "rum-sdk-{prefix}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeProvider {
    timestamp_ms: AtomicI64,
    nanos: AtomicU64,
}

impl ManualTimeProvider {
    pub fn new(start_ms: i64) -> Self {
        Self {
            timestamp_ms: AtomicI64::new(start_ms),
            nanos: AtomicU64::new(1_000_000_000),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.timestamp_ms
            .fetch_add(delta.as_millis() as i64, Ordering::SeqCst);
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Time {
        Time::new(
            self.timestamp_ms.load(Ordering::SeqCst),
            self.nanos.load(Ordering::SeqCst),
        )
    }
}

/// Writer keeping every element in memory.
#[derive(Debug)]
pub struct RecordingWriter<T> {
    written: Mutex<Vec<T>>,
}

impl<T> Default for RecordingWriter<T> {
    fn default() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> RecordingWriter<T> {
    pub fn written(&self) -> Vec<T> {
        self.written.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.written.lock().unwrap().clear();
    }
}

impl<T: Send> DataWriter<T> for RecordingWriter<T> {
    fn write(&self, element: T) {
        self.written.lock().unwrap().push(element);
    }
}
