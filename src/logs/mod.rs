//! Application logs, persisted and uploaded like every other feature.
//!
//! Crash reports are log entries too, written synchronously through the Crash feature so they
//! reach the disk before the process dies.

mod api;
mod model;

#[doc(inline)]
pub use api::{LogsHandle, LogsSettings};

#[doc(inline)]
pub use model::{LogErrorInfo, LogEvent, LogStatus, LoggerInfo};
