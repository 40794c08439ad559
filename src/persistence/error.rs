use std::fmt::{Display, Formatter};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageErrorCode {
    Directory,
    Io,
    Serialization,
    ItemTooLarge,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::Directory => "storage/directory",
            StorageErrorCode::Io => "storage/io",
            StorageErrorCode::Serialization => "storage/serialization",
            StorageErrorCode::ItemTooLarge => "storage/item-too-large",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageError {
    pub code: StorageErrorCode,
    message: String,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

pub fn directory_error(path: &Path, err: impl Display) -> StorageError {
    StorageError::new(
        StorageErrorCode::Directory,
        format!("Storage directory '{}' is unusable: {}", path.display(), err),
    )
}

pub fn io_error(action: &str, path: &Path, err: impl Display) -> StorageError {
    StorageError::new(
        StorageErrorCode::Io,
        format!("Failed to {} '{}': {}", action, path.display(), err),
    )
}

pub fn serialization_error(err: impl Display) -> StorageError {
    StorageError::new(
        StorageErrorCode::Serialization,
        format!("Failed to serialize event: {err}"),
    )
}

pub fn item_too_large(size: usize, limit: usize) -> StorageError {
    StorageError::new(
        StorageErrorCode::ItemTooLarge,
        format!("Serialized event of {size} bytes exceeds the {limit} bytes limit"),
    )
}
