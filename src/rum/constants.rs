use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: f32 = 100.0;
pub const DEFAULT_SESSION_INACTIVITY: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SESSION_MAX_DURATION: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ACTION_INACTIVITY: Duration = Duration::from_millis(100);
pub const DEFAULT_ACTION_MAX_DURATION: Duration = Duration::from_millis(5_000);
pub const DEFAULT_ONGOING_RESOURCE_TTL: Duration = Duration::from_millis(3_000);
pub const DEFAULT_FROZEN_FRAME_THRESHOLD: Duration = Duration::from_millis(700);

/// Bound of the monitor queue; events submitted beyond it are dropped.
pub const MONITOR_QUEUE_CAPACITY: usize = 1024;

pub(crate) const SESSION_TYPE_USER: &str = "user";
pub(crate) const FIRST_PARTY_PROVIDER: &str = "first party";
