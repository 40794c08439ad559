use std::time::Duration;

pub const DEFAULT_MAX_BATCH_SIZE: u64 = 4 * 1024 * 1024;
pub const DEFAULT_MAX_ITEM_SIZE: usize = 512 * 1024;
pub const DEFAULT_MAX_ITEMS_PER_BATCH: usize = 500;
pub const DEFAULT_RECENT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_OLD_FILE_THRESHOLD: Duration = Duration::from_secs(18 * 60 * 60);
pub const DEFAULT_MAX_DISK_SPACE: u64 = 128 * 1024 * 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Size and age limits applied to one feature's batch files.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistenceConfig {
    /// A file stops receiving appends once it would grow past this size.
    pub max_batch_size: u64,
    /// Serialized events of this size or more are dropped.
    pub max_item_size: usize,
    pub max_items_per_batch: usize,
    /// Rollover age: a file older than this is no longer written to and becomes readable.
    pub recent_delay: Duration,
    /// TTL after which a file is deleted whether or not it was uploaded.
    pub old_file_threshold: Duration,
    pub max_disk_space: u64,
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            max_items_per_batch: DEFAULT_MAX_ITEMS_PER_BATCH,
            recent_delay: DEFAULT_RECENT_DELAY,
            old_file_threshold: DEFAULT_OLD_FILE_THRESHOLD,
            max_disk_space: DEFAULT_MAX_DISK_SPACE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PersistenceConfig {
    pub fn with_max_batch_size(mut self, bytes: u64) -> Self {
        self.max_batch_size = bytes;
        self
    }

    pub fn with_max_item_size(mut self, bytes: usize) -> Self {
        self.max_item_size = bytes;
        self
    }

    pub fn with_max_items_per_batch(mut self, items: usize) -> Self {
        self.max_items_per_batch = items;
        self
    }

    pub fn with_recent_delay(mut self, delay: Duration) -> Self {
        self.recent_delay = delay;
        self
    }

    pub fn with_old_file_threshold(mut self, threshold: Duration) -> Self {
        self.old_file_threshold = threshold;
        self
    }

    pub fn with_max_disk_space(mut self, bytes: u64) -> Self {
        self.max_disk_space = bytes;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}
