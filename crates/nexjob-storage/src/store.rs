//! JSON-per-key durable store with atomic writes and change notification.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt value under {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A change to one key. `value` is `None` after removal.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    write_lock: Mutex<()>,
    events: broadcast::Sender<StorageEvent>,
    /// Content digest per key as last written or observed through this handle.
    seen: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

/// Cloned handles share the same directory, write lock, and event channel.
#[derive(Debug, Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                write_lock: Mutex::new(()),
                events,
                seen: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.inner.root.join(format!("{key}.json")))
    }

    /// Serializes read-modify-write sequences within this process.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.write_lock.lock().await
    }

    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    pub async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock().await;
        self.write_json_locked(key, value).await
    }

    /// Caller must hold [`LocalStore::lock`].
    pub async fn write_json_locked<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let json = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let bytes = serde_json::to_vec_pretty(&json).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.write_atomic(&path, &bytes).await?;
        self.remember(key, Some(&bytes));
        self.notify(key, Some(json));
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.lock().await;
        self.remove_locked(key).await
    }

    pub async fn remove_locked(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.remember(key, None);
                self.notify(key, None);
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Polls the directory and announces changes made by other processes.
    ///
    /// Keys present when the watch starts are not announced. Writes made through
    /// this handle are already announced and are not repeated.
    pub async fn watch(&self, every: Duration) -> Result<StoreWatcher, StoreError> {
        self.scan(false).await?;
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let store = LocalStore { inner };
                if let Err(err) = store.scan(true).await {
                    warn!(error = %err, "storage watch scan failed");
                }
            }
        });
        Ok(StoreWatcher { task })
    }

    async fn scan(&self, announce: bool) -> Result<(), StoreError> {
        let _guard = self.lock().await;
        let root = &self.inner.root;
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: root.clone(),
                    source,
                })
            }
        };

        let mut present = HashSet::new();
        let mut changed = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(root))? {
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if self.path_for(key).is_err() {
                continue;
            }
            let bytes = match fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(StoreError::Io {
                        path: entry.path(),
                        source,
                    })
                }
            };
            present.insert(key.to_string());
            if self.remember(key, Some(&bytes)) {
                changed.push((key.to_string(), serde_json::from_slice(&bytes).ok()));
            }
        }

        let gone = {
            let mut seen = self.seen();
            let gone = seen
                .keys()
                .filter(|key| !present.contains(*key))
                .cloned()
                .collect::<Vec<_>>();
            for key in &gone {
                seen.remove(key);
            }
            gone
        };

        if announce {
            for (key, value) in changed {
                debug!(key = %key, "external storage change");
                self.notify(&key, value);
            }
            for key in gone {
                debug!(key = %key, "external storage removal");
                self.notify(&key, None);
            }
        }
        Ok(())
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.inner
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records the digest for `key`; returns whether it differs from the last one seen.
    fn remember(&self, key: &str, bytes: Option<&[u8]>) -> bool {
        let mut seen = self.seen();
        match bytes {
            Some(bytes) => {
                let digest = Sha256::digest(bytes).to_vec();
                seen.insert(key.to_string(), digest.clone()).as_ref() != Some(&digest)
            }
            None => seen.remove(key).is_some(),
        }
    }

    fn notify(&self, key: &str, value: Option<serde_json::Value>) {
        // No receivers is fine.
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            value,
        });
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.inner.root)
            .await
            .map_err(io_err(&self.inner.root))?;

        let temp_path = self
            .inner
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(io_err(&temp_path))?;
        file.write_all(bytes).await.map_err(io_err(&temp_path))?;
        file.flush().await.map_err(io_err(&temp_path))?;
        drop(file);

        if let Err(source) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }
}

/// Stops the directory poll when dropped.
#[derive(Debug)]
pub struct StoreWatcher {
    task: JoinHandle<()>,
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_keys_read_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        let value: Option<Vec<String>> = store.read_json("nexjob_bookmarks").await.expect("read");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn writes_are_atomic_and_leave_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path().join("nested"));
        store
            .write_json("nexjob_bookmarks", &vec!["1", "2"])
            .await
            .expect("write");
        store
            .write_json("nexjob_bookmarks", &vec!["3"])
            .await
            .expect("overwrite");

        let value: Option<Vec<String>> = store.read_json("nexjob_bookmarks").await.expect("read");
        assert_eq!(value, Some(vec!["3".to_string()]));

        let mut entries = std::fs::read_dir(dir.path().join("nested"))
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["nexjob_bookmarks.json"]);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.write_json("../escape", &1).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_json_is_reported() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("nexjob_admin_auth.json"), b"{not json").expect("seed");
        let store = LocalStore::new(dir.path());
        let result: Result<Option<serde_json::Value>, _> =
            store.read_json("nexjob_admin_auth").await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn cloned_handles_see_each_others_events() {
        let dir = tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        let other = store.clone();
        let mut rx = other.subscribe();

        store.write_json("nexjob_bookmarks", &vec!["7"]).await.expect("write");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.key, "nexjob_bookmarks");
        assert_eq!(event.value, Some(serde_json::json!(["7"])));

        assert!(store.remove("nexjob_bookmarks").await.expect("remove"));
        assert_eq!(rx.recv().await.expect("event").value, None);
        assert!(!store.remove("nexjob_bookmarks").await.expect("remove again"));
    }

    #[tokio::test]
    async fn watcher_announces_writes_from_another_store() {
        let dir = tempdir().expect("tempdir");
        let viewer = LocalStore::new(dir.path());
        let other = LocalStore::new(dir.path());
        other.write_json("nexjob_admin_settings", &serde_json::json!({})).await.expect("seed");

        let _watcher = viewer.watch(Duration::from_millis(20)).await.expect("watch");
        let mut rx = viewer.subscribe();

        other.write_json("nexjob_bookmarks", &vec!["42"]).await.expect("write");
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("announced in time")
            .expect("event");
        assert_eq!(event.key, "nexjob_bookmarks");
        assert_eq!(event.value, Some(serde_json::json!(["42"])));

        assert!(other.remove("nexjob_bookmarks").await.expect("remove"));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("announced in time")
            .expect("event");
        assert_eq!(event.key, "nexjob_bookmarks");
        assert_eq!(event.value, None);
    }

    #[tokio::test]
    async fn watcher_does_not_repeat_own_writes() {
        let dir = tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        let _watcher = store.watch(Duration::from_millis(10)).await.expect("watch");
        let mut rx = store.subscribe();

        store.write_json("nexjob_bookmarks", &vec!["1"]).await.expect("write");
        assert_eq!(rx.recv().await.expect("event").value, Some(serde_json::json!(["1"])));
        let repeat = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(repeat.is_err(), "own write announced twice: {repeat:?}");
    }
}
