use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::warn;

use crate::{
    error::{Result, StoreError},
    store::{Handle, MessageStore, Retrieved},
};

/// Local-filesystem message store.
///
/// Each stored value becomes one `<ulid>.json` file in the configured
/// directory; ULID filenames sort lexicographically by creation time, so
/// directory order is FIFO. Writes go to a temporary file first and are
/// atomically renamed into place, so a reader never observes a partial
/// entry. The retrieve handle is the file's absolute path.
///
/// Reservations are in-process only: a second `DirectoryStore` on the same
/// directory in another process may retrieve the same file. Entries a crashed
/// process never acknowledged simply become retrievable again on restart.
#[derive(Debug)]
pub struct DirectoryStore {
    path: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl DirectoryStore {
    /// Open a store over the given directory, creating it if needed.
    ///
    /// # Errors
    /// If the path exists but is not a directory, or cannot be created
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if fs::try_exists(&path).await? {
            if !fs::metadata(&path).await?.is_dir() {
                return Err(StoreError::Validation(format!(
                    "expected {} to be a directory, but it is not",
                    path.display()
                )));
            }
        } else {
            fs::create_dir_all(&path).await?;
        }

        Ok(Self {
            path,
            reserved: Mutex::new(HashSet::new()),
        })
    }

    /// The directory backing this store
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reserve(&self, path: &Path) -> Result<bool> {
        Ok(self.reserved.lock()?.insert(path.to_path_buf()))
    }

    fn release(&self, path: &Path) -> Result<bool> {
        Ok(self.reserved.lock()?.remove(path))
    }

    /// List candidate entry files in retrieval order
    async fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(".json") && !name.starts_with('.') {
                names.push(name.to_string());
            }
        }

        // ULID filenames: lexicographic order is creation order
        names.sort();
        Ok(names.into_iter().map(|n| self.path.join(n)).collect())
    }
}

#[async_trait]
impl MessageStore for DirectoryStore {
    async fn store(&self, value: &Value) -> Result<()> {
        let name = format!("{}.json", ulid::Ulid::new());
        let final_path = self.path.join(&name);
        let temp_path = self.path.join(format!(".tmp_{name}"));

        // Write to a temporary file first, then atomically rename
        let encoded = serde_json::to_vec(value)?;
        fs::write(&temp_path, encoded).await?;
        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<Retrieved>> {
        for path in self.entry_files().await? {
            // Reserve before reading so concurrent retrievals never hand out
            // the same file; losing the race just moves on to the next entry.
            if !self.reserve(&path)? {
                continue;
            }

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable store entry");
                    self.release(&path)?;
                    continue;
                }
            };

            match serde_json::from_slice(&bytes) {
                Ok(content) => {
                    let absolute = fs::canonicalize(&path).await.unwrap_or_else(|_| path.clone());
                    if absolute != path {
                        let mut reserved = self.reserved.lock()?;
                        reserved.remove(&path);
                        reserved.insert(absolute.clone());
                    }
                    return Ok(Some(Retrieved {
                        handle: Handle::new(absolute.to_string_lossy().into_owned()),
                        content,
                    }));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping non-JSON store entry");
                    self.release(&path)?;
                }
            }
        }

        Ok(None)
    }

    async fn acknowledge(&self, handle: &Handle, success: bool) -> Result<()> {
        let path = PathBuf::from(handle.as_str());

        if !self.release(&path)? {
            return Err(StoreError::UnknownHandle(handle.clone()));
        }

        if success {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }
}
