use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Checkpoint, CheckpointKey, Checkpointer, check_thread_id};
use crate::errors::CheckpointError;
use crate::util::thread_file_stem;

const EXTENSION: &str = "json";

/// Checkpoint store backed by one JSON file per thread id.
///
/// File names are the SHA-256 of the thread id, so any thread id maps to a
/// safe file name of fixed length. `list` reads thread ids back from the
/// files. Writes go to a temporary file that is renamed over the target, so
/// readers see either the previous snapshot or the new one.
#[derive(Debug)]
pub struct FileCheckpointer {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Just enough of a stored checkpoint to recover its thread id.
#[derive(Deserialize)]
struct StoredKey {
    key: CheckpointKey,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", thread_file_stem(thread_id)))
    }

    fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the caller's handle and forget the lock once nobody else holds it.
    fn release(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn write_file(&self, checkpoint: &Checkpoint, bytes: &[u8]) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(&self.dir, e))?;

        let target = self.path_for(checkpoint.thread_id());
        let tmp = target.with_extension(format!("{EXTENSION}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Self::io_error(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Self::io_error(&target, e));
        }

        debug!(
            thread_id = checkpoint.thread_id(),
            step = checkpoint.step,
            path = %target.display(),
            "Wrote checkpoint"
        );
        Ok(())
    }

    async fn read_file(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(thread_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Checkpoint::from_json(thread_id, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    async fn remove_file(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    /// Thread id stored in `path`, if the file is a checkpoint of this store.
    async fn stored_thread_id(path: &Path) -> Option<String> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint file");
                return None;
            }
        };
        let thread_id = match serde_json::from_slice::<StoredKey>(&bytes) {
            Ok(stored) => stored.key.thread_id,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unrecognized checkpoint file");
                return None;
            }
        };
        let expected = thread_file_stem(&thread_id);
        if path.file_stem().and_then(|s| s.to_str()) != Some(expected.as_str()) {
            warn!(
                path = %path.display(),
                thread_id,
                "Skipping checkpoint file stored under another thread's name"
            );
            return None;
        }
        Some(thread_id)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let thread_id = checkpoint.thread_id();
        check_thread_id(thread_id)?;
        let bytes = checkpoint.to_json()?;

        let lock = self.lock_for(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.write_file(checkpoint, &bytes).await
        };
        self.release(thread_id, lock);
        result
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        check_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.read_file(thread_id).await
        };
        self.release(thread_id, lock);
        result
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        check_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_file(thread_id).await
        };
        self.release(thread_id, lock);
        result
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir, e)),
        };

        let mut threads = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            if let Some(thread_id) = Self::stored_thread_id(&path).await {
                threads.push(thread_id);
            }
        }
        threads.sort();
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::tests::sample;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());
        let checkpoint = sample("t-1", 1);

        store.put(&checkpoint).await.unwrap();
        let loaded = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn test_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        FileCheckpointer::new(dir.path())
            .put(&sample("t-1", 3))
            .await
            .unwrap();

        let reopened = FileCheckpointer::new(dir.path());
        let loaded = reopened.get("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.step, 3);
    }

    #[tokio::test]
    async fn test_thread_id_with_path_characters() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());
        store.put(&sample("../escape/me", 1)).await.unwrap();

        assert!(store.get("../escape/me").await.unwrap().is_some());
        assert_eq!(store.list().await.unwrap(), vec!["../escape/me"]);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_long_thread_id() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());
        let thread_id = "long-thread-".repeat(40);

        store.put(&sample(&thread_id, 2)).await.unwrap();

        let loaded = store.get(&thread_id).await.unwrap().unwrap();
        assert_eq!(loaded.step, 2);
        assert_eq!(store.list().await.unwrap(), vec![thread_id.clone()]);
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            assert!(entry.unwrap().file_name().len() < 255);
        }
        assert!(store.delete(&thread_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());
        store.put(&sample("t-1", 1)).await.unwrap();

        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::copy(store.path_for("t-1"), dir.path().join("copy.json")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["t-1"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());
        std::fs::write(store.path_for("t-1"), "{ truncated").unwrap();

        let err = store.get("t-1").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path().join("not-yet"));
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get("t-1").await.unwrap().is_none());

        store.put(&sample("t-1", 1)).await.unwrap();
        assert!(store.delete("t-1").await.unwrap());
        assert!(!store.delete("t-1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_on_distinct_threads() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileCheckpointer::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put(&sample(&format!("t-{i}"), 1)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 8);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());

        for i in 0..16 {
            let thread_id = format!("t-{i}");
            store.put(&sample(&thread_id, 1)).await.unwrap();
            store.get(&thread_id).await.unwrap();
            store.delete(&thread_id).await.unwrap();
        }
        store.get("never-written").await.unwrap();

        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::new(dir.path());

        let held = store.lock_for("t-1");
        store.put(&sample("t-1", 1)).await.unwrap();
        assert!(store.locks.contains_key("t-1"));
        drop(held);

        store.get("t-1").await.unwrap();
        assert!(store.locks.is_empty());
    }
}
