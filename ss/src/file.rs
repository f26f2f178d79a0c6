//! File-backed store: one JSON file per key

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::RECORD_EXTENSION;
use crate::store::{KeyValueStore, StoreError, StoreResult, validate_key};

const LOCK_FILE: &str = ".lock";

/// Durable [`KeyValueStore`] rooted at a directory
///
/// Writes go to a temp file in the target directory and are renamed into
/// place while holding an exclusive advisory lock on `<root>/.lock`, so a
/// reader never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open or create a store at the given directory
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Opened file store");
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(root: &Path, key: &str) -> PathBuf {
        root.join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    fn lock(root: &Path) -> io::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    }

    fn write_atomic(root: &Path, key: &str, value: &str) -> io::Result<()> {
        let path = Self::path_for(root, key);
        let dir = path.parent().unwrap_or(root).to_path_buf();

        // Under the lock, so a concurrent delete cannot prune the directory first
        let _guard = Self::lock(root)?;
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn read(root: &Path, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(Self::path_for(root, key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(root: &Path, key: &str) -> io::Result<()> {
        let path = Self::path_for(root, key);
        let _guard = Self::lock(root)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        // Prune now-empty session directories, never the root itself
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == root || fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
        Ok(())
    }

    fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                Self::collect_keys(root, &path, out)?;
            } else if path.extension().is_some_and(|e| e == RECORD_EXTENSION)
                && let Ok(rel) = path.with_extension("").strip_prefix(root)
            {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> io::Result<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(root))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        debug!(%key, "FileStore::get: called");
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(move |root| Self::read(&root, &key)).await
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        debug!(%key, len = value.len(), "FileStore::put: called");
        validate_key(key)?;
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |root| Self::write_atomic(&root, &key, &value)).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        debug!(%key, "FileStore::remove: called");
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(move |root| Self::delete(&root, &key)).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        debug!("FileStore::keys: called");
        self.blocking(|root| {
            let mut keys = Vec::new();
            Self::collect_keys(&root, &root, &mut keys)?;
            keys.sort();
            Ok(keys)
        })
        .await
    }
}
