use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::persistence::config::PersistenceConfig;
use crate::persistence::error::{directory_error, io_error, StorageResult};
use crate::platform::time::TimeProvider;

/// File currently receiving appends.
#[derive(Clone, Debug)]
struct HotFile {
    path: PathBuf,
    created_ms: i64,
    size: u64,
    items: usize,
}

/// Picks the batch file to append to and the batch files that are safe to read, inside one
/// directory. Files are named after their creation time in wall-clock milliseconds, so a
/// lexical scan is also a chronological one.
///
/// Only one file is ever hot. It stays hot while it is younger than `recent_delay`, below
/// `max_batch_size` and below `max_items_per_batch`; the first write that would break one of
/// these limits rolls over to a fresh file.
pub struct FileOrchestrator {
    root: PathBuf,
    config: PersistenceConfig,
    time: Arc<dyn TimeProvider>,
    hot: Option<HotFile>,
    last_created_ms: i64,
}

impl std::fmt::Debug for FileOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileOrchestrator")
            .field("root", &self.root)
            .field("hot", &self.hot)
            .finish()
    }
}

impl FileOrchestrator {
    pub fn new(root: PathBuf, config: PersistenceConfig, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            root,
            config,
            time,
            hot: None,
            last_created_ms: i64::MIN,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_directory(&self) -> StorageResult<()> {
        if self.root.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.root).map_err(|err| directory_error(&self.root, err))?;
        if !self.root.is_dir() {
            return Err(directory_error(&self.root, "not a directory"));
        }
        Ok(())
    }

    /// Returns the file the next `size_hint` bytes must be appended to and accounts for them.
    pub fn get_writable_file(&mut self, size_hint: u64) -> StorageResult<PathBuf> {
        self.ensure_directory()?;
        let now = self.time.wall_clock_ms();

        if let Some(hot) = self.hot.as_mut() {
            let fits = hot.size.saturating_add(size_hint) <= self.config.max_batch_size;
            let has_room = hot.items < self.config.max_items_per_batch;
            let recent = is_recent(hot.created_ms, now, &self.config);
            if fits && has_room && recent && hot.path.exists() {
                hot.size += size_hint;
                hot.items += 1;
                return Ok(hot.path.clone());
            }
        }

        self.purge_expired()?;
        self.free_disk_space(size_hint)?;

        let created_ms = now.max(self.last_created_ms.saturating_add(1));
        let path = self.root.join(created_ms.to_string());
        File::create(&path).map_err(|err| io_error("create batch file", &path, err))?;
        log::debug!("rolled over to new batch file {}", path.display());
        self.last_created_ms = created_ms;
        self.hot = Some(HotFile {
            path: path.clone(),
            created_ms,
            size: size_hint,
            items: 1,
        });
        Ok(path)
    }

    /// Gives back what [`get_writable_file`](Self::get_writable_file) accounted for `path` when
    /// the append never reached the disk.
    pub fn cancel_write(&mut self, path: &Path, size_hint: u64) {
        if let Some(hot) = self.hot.as_mut().filter(|hot| hot.path == path) {
            hot.size = hot.size.saturating_sub(size_hint);
            hot.items = hot.items.saturating_sub(1);
        }
    }

    /// Oldest file that can be read: not currently writable, past the rollover age, not
    /// expired and not in `excluded`.
    pub fn get_readable_file(&mut self, excluded: &HashSet<PathBuf>) -> StorageResult<Option<PathBuf>> {
        self.purge_expired()?;
        let now = self.time.wall_clock_ms();
        Ok(self
            .list_files()?
            .into_iter()
            .find(|(path, created_ms)| {
                !excluded.contains(path)
                    && !self.is_writable(path, now)
                    && !is_recent(*created_ms, now, &self.config)
            })
            .map(|(path, _)| path))
    }

    /// Every file except the one currently open for writing.
    pub fn get_readable_files(&self) -> StorageResult<Vec<PathBuf>> {
        let now = self.time.wall_clock_ms();
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|(path, _)| !self.is_writable(path, now))
            .map(|(path, _)| path)
            .collect())
    }

    pub fn all_files(&self) -> StorageResult<Vec<PathBuf>> {
        Ok(self.list_files()?.into_iter().map(|(path, _)| path).collect())
    }

    /// Deletes every file older than the TTL, uploaded or not. Returns how many were removed.
    pub fn purge_expired(&mut self) -> StorageResult<usize> {
        let now = self.time.wall_clock_ms();
        let threshold = duration_ms(self.config.old_file_threshold);
        let mut removed = 0;
        for (path, created_ms) in self.list_files()? {
            if now.saturating_sub(created_ms) > threshold {
                log::debug!("purging expired batch file {}", path.display());
                self.delete_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn delete_file(&mut self, path: &Path) -> StorageResult<()> {
        if self.hot.as_ref().is_some_and(|hot| hot.path == path) {
            self.hot = None;
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("delete batch file", path, err)),
        }
    }

    pub fn delete_all(&mut self) -> StorageResult<()> {
        for path in self.all_files()? {
            self.delete_file(&path)?;
        }
        self.hot = None;
        Ok(())
    }

    /// Moves every file of this directory into `target`, keeping creation order.
    pub fn move_all_to(&mut self, target: &mut FileOrchestrator) -> StorageResult<usize> {
        target.ensure_directory()?;
        self.hot = None;
        let mut moved = 0;
        for (path, created_ms) in self.list_files()? {
            let mut stamp = created_ms;
            let mut destination = target.root.join(stamp.to_string());
            while destination.exists() {
                stamp += 1;
                destination = target.root.join(stamp.to_string());
            }
            fs::rename(&path, &destination)
                .map_err(|err| io_error("move batch file", &path, err))?;
            target.last_created_ms = target.last_created_ms.max(stamp);
            moved += 1;
        }
        Ok(moved)
    }

    fn is_writable(&self, path: &Path, now: i64) -> bool {
        self.hot
            .as_ref()
            .is_some_and(|hot| hot.path == path && is_recent(hot.created_ms, now, &self.config))
    }

    fn free_disk_space(&mut self, incoming: u64) -> StorageResult<()> {
        let mut files = Vec::new();
        let mut total: u64 = 0;
        for (path, _) in self.list_files()? {
            let size = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
            total = total.saturating_add(size);
            files.push((path, size));
        }
        let budget = self.config.max_disk_space;
        let mut iter = files.into_iter();
        while total.saturating_add(incoming) > budget {
            let Some((path, size)) = iter.next() else {
                break;
            };
            log::warn!(
                "storage for {} exceeds {} bytes, deleting oldest batch {}",
                self.root.display(),
                budget,
                path.display()
            );
            self.delete_file(&path)?;
            total = total.saturating_sub(size);
        }
        Ok(())
    }

    fn list_files(&self) -> StorageResult<Vec<(PathBuf, i64)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error("list directory", &self.root, err)),
        };
        let mut files: Vec<(PathBuf, i64)> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let created_ms = entry.file_name().to_str()?.parse::<i64>().ok()?;
                Some((entry.path(), created_ms))
            })
            .collect();
        files.sort_by_key(|(_, created_ms)| *created_ms);
        Ok(files)
    }
}

fn is_recent(created_ms: i64, now: i64, config: &PersistenceConfig) -> bool {
    now.saturating_sub(created_ms) < duration_ms(config.recent_delay)
}

fn duration_ms(duration: std::time::Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}
