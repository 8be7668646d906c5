use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, Result};
use crate::path_format;
use crate::storage::{StoredObject, Storage};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        // Create directory if it doesn't exist
        fs::create_dir_all(&base_path).await?;

        Ok(Self { base_path })
    }

    fn get_file_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key.trim_start_matches(['/', '\\']))
    }

    fn key_for(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.base_path)
            .map_err(|_| ApiError::Storage(format!("{} is outside the storage root", path.display())))?;

        let joined = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!("/{}", joined))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<StoredObject> {
        let key = path_format::normalize(&format!("/{}", key));
        let file_path = self.get_file_path(&key);

        // Ensure parent directory exists
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&file_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        let title = key.rsplit('/').next().unwrap_or_default().to_string();

        Ok(StoredObject {
            key,
            title,
            size: data.len() as u64,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let search_path = self.get_file_path(prefix.trim_end_matches(['/', '\\']));

        let metadata = fs::metadata(&search_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                return ApiError::DirectoryNotFound(prefix.to_string());
            }
            ApiError::Io(e)
        })?;

        if !metadata.is_dir() {
            return Err(ApiError::NotADirectory(prefix.to_string()));
        }

        let mut keys = Vec::new();
        let mut pending = vec![search_path];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    keys.push(self.key_for(&path)?);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.get_file_path(key)).await?)
    }
}
