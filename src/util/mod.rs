pub mod backoff;

pub use backoff::{calculate_backoff, BackoffConfig, MAX_BACKOFF_MILLIS, RANDOM_FACTOR};
