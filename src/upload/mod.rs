//! Background delivery of persisted batches.
//!
//! Each feature runs one [`UploadScheduler`]: a self-rescheduling loop that reads the oldest
//! readable batch, hands it to a [`DataUploader`] and turns the resulting [`UploadStatus`] into
//! a keep/delete decision and the next delay.

mod scheduler;
mod uploader;

#[doc(inline)]
pub use scheduler::{UploadDelay, UploadScheduler};

#[doc(inline)]
pub use uploader::{DataUploader, HttpUploader, UploadStatus};
