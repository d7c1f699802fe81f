//! Storage module
//!
//! Everything the API persists goes through [`DataStore`]: the shared
//! dataset, per-user snapshots and generated exports. The handlers never
//! see paths, so the directory layout can change without touching them.

mod file;
pub mod table;

pub use file::FileStore;
pub use table::Row;

use async_trait::async_trait;
use hyper::body::Bytes;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raw dataset bytes plus the time it was last replaced
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub data: Bytes,
    pub modified: SystemTime,
}

/// Existence of each managed directory, as reported by the health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStatus {
    pub csv: bool,
    pub user_csv: bool,
    pub temp_images: bool,
}

/// Persistence seam between the HTTP handlers and the backing store
///
/// Every `put_*` replaces the whole object. Concurrent writers to the same
/// object race and the last one wins; readers never see a partial write.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Current dataset, `None` when nothing has been uploaded yet
    async fn get_dataset(&self) -> Result<Option<StoredFile>, StoreError>;

    /// Replace the dataset with the given rows, returns the number written
    async fn put_dataset(&self, rows: &[Row]) -> Result<usize, StoreError>;

    /// Replace the snapshot for `user_id`
    async fn put_user_snapshot(&self, user_id: &str, rows: &[Row]) -> Result<usize, StoreError>;

    /// Write an export under `name`
    async fn put_export(&self, name: &str, data: Bytes) -> Result<(), StoreError>;

    /// Fetch an export by name, `None` when it does not exist
    async fn get_export(&self, name: &str) -> Result<Option<StoredFile>, StoreError>;

    /// Whether each managed directory currently exists
    async fn directories(&self) -> DirectoryStatus;
}

/// Check that `name` can be used as a single file name component
///
/// Accepts non-empty names made of ASCII letters, digits, `-`, `_` and `.`
/// that do not start with a dot. Rules out separators and `..`.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Check that `key` can be embedded in a generated file name (ZIP codes, user ids)
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
}
