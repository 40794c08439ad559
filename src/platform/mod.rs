pub mod time;
pub mod worker;

pub use time::{SystemTimeProvider, Time, TimeProvider};
pub use worker::{SingleWorker, WorkerTask};
