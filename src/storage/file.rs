//! Directory-backed store
//!
//! Layout under the configured base directory:
//! - `<dataset_dir>/combined.csv`
//! - `<user_dir>/user_<id>.csv`
//! - `<user_dir>/<export name>`
//! - `<temp_image_dir>/` (created, never written)

use async_trait::async_trait;
use hyper::body::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::table::{self, Row};
use super::{is_safe_file_name, is_safe_key, DataStore, DirectoryStatus, StoreError, StoredFile};
use crate::config::StorageConfig;

const DATASET_FILE: &str = "combined.csv";

/// Distinguishes temp files of concurrent writers within this process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Store that keeps every object as a CSV file on local disk
#[derive(Debug, Clone)]
pub struct FileStore {
    dataset_dir: PathBuf,
    user_dir: PathBuf,
    temp_image_dir: PathBuf,
}

impl FileStore {
    /// Open the store, creating any missing directory
    pub async fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        let store = Self {
            dataset_dir: config.dataset_path(),
            user_dir: config.user_path(),
            temp_image_dir: config.temp_image_path(),
        };

        for dir in [&store.dataset_dir, &store.user_dir, &store.temp_image_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }

        Ok(store)
    }

    pub fn dataset_file(&self) -> PathBuf {
        self.dataset_dir.join(DATASET_FILE)
    }

    #[cfg(test)]
    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }
}

#[async_trait]
impl DataStore for FileStore {
    async fn get_dataset(&self) -> Result<Option<StoredFile>, StoreError> {
        read_optional(&self.dataset_file()).await
    }

    async fn put_dataset(&self, rows: &[Row]) -> Result<usize, StoreError> {
        let data = table::encode_rows(rows)?;
        replace_file(&self.dataset_file(), &data).await?;
        Ok(rows.len())
    }

    async fn put_user_snapshot(&self, user_id: &str, rows: &[Row]) -> Result<usize, StoreError> {
        if !is_safe_key(user_id) {
            return Err(StoreError::InvalidName(user_id.to_string()));
        }
        let data = table::encode_rows(rows)?;
        let path = self.user_dir.join(format!("user_{user_id}.csv"));
        replace_file(&path, &data).await?;
        Ok(rows.len())
    }

    async fn put_export(&self, name: &str, data: Bytes) -> Result<(), StoreError> {
        if !is_safe_file_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        replace_file(&self.user_dir.join(name), &data).await
    }

    async fn get_export(&self, name: &str) -> Result<Option<StoredFile>, StoreError> {
        if !is_safe_file_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        read_optional(&self.user_dir.join(name)).await
    }

    async fn directories(&self) -> DirectoryStatus {
        DirectoryStatus {
            csv: is_dir(&self.dataset_dir).await,
            user_csv: is_dir(&self.user_dir).await,
            temp_images: is_dir(&self.temp_image_dir).await,
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// Read a regular file, `None` if it does not exist
async fn read_optional(path: &Path) -> Result<Option<StoredFile>, StoreError> {
    let mut file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let metadata = file.metadata().await.map_err(|e| StoreError::io(path, e))?;
    if !metadata.is_file() {
        return Ok(None);
    }
    let modified = metadata.modified().map_err(|e| StoreError::io(path, e))?;

    let mut data = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    file.read_to_end(&mut data)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    Ok(Some(StoredFile {
        data: Bytes::from(data),
        modified,
    }))
}

/// Replace `path` with `data` by writing a sibling temp file and renaming it
/// over the target, so readers see either the old or the new content.
async fn replace_file(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::InvalidName(path.display().to_string()))?;
    let temp = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(StoreError::io(&temp, e));
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}
