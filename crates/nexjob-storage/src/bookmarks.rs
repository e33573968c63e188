//! Saved job ids, persisted under one key per visitor.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::store::{LocalStore, StorageEvent, StoreError};

pub const BOOKMARKS_KEY: &str = "nexjob_bookmarks";

#[derive(Debug, Clone)]
pub struct BookmarkStore {
    store: LocalStore,
    key: String,
}

impl BookmarkStore {
    /// The unscoped set under [`BOOKMARKS_KEY`], used by the CLI.
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            key: BOOKMARKS_KEY.to_string(),
        }
    }

    /// The set belonging to one visitor, stored as `nexjob_bookmarks_<client>`.
    pub fn for_client(store: LocalStore, client_id: &str) -> Result<Self, StoreError> {
        let key = format!("{BOOKMARKS_KEY}_{client_id}");
        store.path_for(&key)?;
        Ok(Self { store, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Saved ids in insertion order. A corrupt value reads as empty.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        match self.store.read_json::<Vec<String>>(&self.key).await {
            Ok(ids) => Ok(ids.unwrap_or_default()),
            Err(StoreError::Corrupt { source, .. }) => {
                warn!(error = %source, "bookmark list unreadable; treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn is_bookmarked(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.list().await?.iter().any(|id| id == job_id))
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list().await?.len())
    }

    pub async fn add(&self, job_id: &str) -> Result<bool, StoreError> {
        self.set(job_id, true).await
    }

    pub async fn remove(&self, job_id: &str) -> Result<bool, StoreError> {
        self.set(job_id, false).await
    }

    /// Flips membership and returns the new state.
    pub async fn toggle(&self, job_id: &str) -> Result<bool, StoreError> {
        let _guard = self.store.lock().await;
        let mut ids = self.list().await?;
        let now_saved = if let Some(pos) = ids.iter().position(|id| id == job_id) {
            ids.remove(pos);
            false
        } else {
            ids.push(job_id.to_string());
            true
        };
        self.store.write_json_locked(&self.key, &ids).await?;
        Ok(now_saved)
    }

    /// Returns whether the set changed. Unchanged sets are not rewritten.
    async fn set(&self, job_id: &str, saved: bool) -> Result<bool, StoreError> {
        let _guard = self.store.lock().await;
        let mut ids = self.list().await?;
        let present = ids.iter().any(|id| id == job_id);
        match (saved, present) {
            (true, false) => ids.push(job_id.to_string()),
            (false, true) => ids.retain(|id| id != job_id),
            _ => return Ok(false),
        }
        self.store.write_json_locked(&self.key, &ids).await?;
        Ok(true)
    }

    pub fn subscribe(&self) -> BookmarkEvents {
        BookmarkEvents {
            rx: self.store.subscribe(),
            key: self.key.clone(),
        }
    }
}

/// Stream of bookmark snapshots, one per effective change.
#[derive(Debug)]
pub struct BookmarkEvents {
    rx: broadcast::Receiver<StorageEvent>,
    key: String,
}

impl BookmarkEvents {
    /// Next snapshot of saved ids; `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Vec<String>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.key == self.key => {
                    let ids = event
                        .value
                        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
                        .unwrap_or_default();
                    return Some(ids);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bookmark subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> BookmarkStore {
        BookmarkStore::new(LocalStore::new(dir.path()))
    }

    #[tokio::test]
    async fn toggle_twice_restores_state() {
        let dir = tempdir().expect("tempdir");
        let bookmarks = store_in(&dir);

        assert!(bookmarks.toggle("42").await.expect("toggle"));
        assert!(bookmarks.is_bookmarked("42").await.expect("check"));
        assert!(!bookmarks.toggle("42").await.expect("toggle back"));
        assert!(!bookmarks.is_bookmarked("42").await.expect("check"));
        assert_eq!(bookmarks.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let dir = tempdir().expect("tempdir");
        let bookmarks = store_in(&dir);

        assert!(bookmarks.add("1").await.expect("add"));
        assert!(!bookmarks.add("1").await.expect("re-add"));
        assert!(bookmarks.add("2").await.expect("add"));
        assert_eq!(bookmarks.list().await.expect("list"), vec!["1", "2"]);
        assert_eq!(
            bookmarks.count().await.expect("count"),
            bookmarks.list().await.expect("list").len()
        );

        assert!(bookmarks.remove("1").await.expect("remove"));
        assert!(!bookmarks.remove("1").await.expect("re-remove"));
        assert_eq!(bookmarks.list().await.expect("list"), vec!["2"]);
    }

    #[tokio::test]
    async fn persists_across_handles() {
        let dir = tempdir().expect("tempdir");
        store_in(&dir).add("9").await.expect("add");
        assert_eq!(store_in(&dir).list().await.expect("list"), vec!["9"]);
    }

    #[tokio::test]
    async fn corrupt_value_reads_as_empty_and_recovers() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("nexjob_bookmarks.json"), b"[1, oops").expect("seed");
        let bookmarks = store_in(&dir);
        assert!(bookmarks.list().await.expect("list").is_empty());
        assert!(bookmarks.toggle("5").await.expect("toggle"));
        assert_eq!(bookmarks.list().await.expect("list"), vec!["5"]);
    }

    #[tokio::test]
    async fn subscribers_on_shared_store_see_every_change() {
        let dir = tempdir().expect("tempdir");
        let shared = LocalStore::new(dir.path());
        let writer = BookmarkStore::new(shared.clone());
        let reader = BookmarkStore::new(shared.clone());
        let mut writer_events = writer.subscribe();
        let mut reader_events = reader.subscribe();

        // Unrelated keys are filtered out.
        shared
            .write_json("nexjob_admin_auth", &serde_json::json!({"email": "a@b.c"}))
            .await
            .expect("write");
        writer.toggle("42").await.expect("toggle");
        // No-op mutations do not notify.
        writer.add("42").await.expect("add");
        writer.remove("42").await.expect("remove");

        assert_eq!(reader_events.next().await, Some(vec!["42".to_string()]));
        assert_eq!(reader_events.next().await, Some(Vec::new()));
        assert_eq!(writer_events.next().await, Some(vec!["42".to_string()]));
        assert_eq!(writer_events.next().await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn client_sets_are_independent() {
        let dir = tempdir().expect("tempdir");
        let shared = LocalStore::new(dir.path());
        let alice = BookmarkStore::for_client(shared.clone(), "aaaa").expect("alice");
        let bob = BookmarkStore::for_client(shared.clone(), "bbbb").expect("bob");
        let mut bob_events = bob.subscribe();

        alice.toggle("42").await.expect("toggle");
        bob.toggle("7").await.expect("toggle");

        assert_eq!(alice.list().await.expect("list"), vec!["42"]);
        assert_eq!(bob.list().await.expect("list"), vec!["7"]);
        assert_eq!(bob_events.next().await, Some(vec!["7".to_string()]));
        assert!(dir.path().join("nexjob_bookmarks_aaaa.json").exists());
    }

    #[tokio::test]
    async fn client_ids_must_be_key_safe() {
        let dir = tempdir().expect("tempdir");
        let shared = LocalStore::new(dir.path());
        assert!(BookmarkStore::for_client(shared.clone(), "../etc").is_err());
        assert!(BookmarkStore::for_client(shared, "ABC").is_err());
    }

    #[tokio::test]
    async fn watched_store_sees_toggles_from_a_separate_process_handle() {
        let dir = tempdir().expect("tempdir");
        let viewer = LocalStore::new(dir.path());
        let _watcher = viewer
            .watch(std::time::Duration::from_millis(20))
            .await
            .expect("watch");
        let mut events = BookmarkStore::new(viewer).subscribe();

        store_in(&dir).toggle("42").await.expect("toggle");
        let seen = tokio::time::timeout(std::time::Duration::from_secs(2), events.next())
            .await
            .expect("change seen in time");
        assert_eq!(seen, Some(vec!["42".to_string()]));
    }
}
