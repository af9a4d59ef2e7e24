use crate::domain::model::SourceState;
use crate::domain::ports::SourceStateStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Source cooldown state persisted as a small JSON map on disk, surviving
/// across runs. The file doubles as an operator-editable kill switch.
pub struct JsonStateStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within one process.
    lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt file reads as empty; cooldown state is advisory
    /// and must never block a run.
    async fn read_map(&self) -> HashMap<String, SourceState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    "cooldown state {} unparsable ({}); treating as empty",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    async fn write_map(&self, map: &HashMap<String, SourceState>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SourceStateStore for JsonStateStore {
    async fn get(&self, key: &str) -> Result<Option<SourceState>> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;

        // Lazily drop entries whose cooldown has elapsed; best-effort, the
        // answer is correct even when the rewrite fails.
        let now = Utc::now();
        let before = map.len();
        map.retain(|_, state| state.disabled_until > now);
        if map.len() != before {
            if let Err(e) = self.write_map(&map).await {
                tracing::warn!("cooldown cleanup write failed: {}", e);
            }
        }

        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, state: SourceState) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        map.insert(key.to_string(), state);
        self.write_map(&map).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, JsonStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("sources-disabled.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_set_get_clear_round_trip() {
        let (_dir, store) = store();
        let state = SourceState {
            reason: "HTTP request failed".to_string(),
            disabled_until: Utc::now() + Duration::hours(6),
        };
        store.set("magellan", state.clone()).await.unwrap();

        let got = store.get("magellan").await.unwrap().unwrap();
        assert_eq!(got.reason, state.reason);
        assert!(store.get("xo").await.unwrap().is_none());

        store.clear("magellan").await.unwrap();
        assert!(store.get("magellan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_lazily_removed() {
        let (_dir, store) = store();
        store
            .set(
                "xo",
                SourceState {
                    reason: "timeout".to_string(),
                    disabled_until: Utc::now() - Duration::minutes(1),
                },
            )
            .await
            .unwrap();

        assert!(store.get("xo").await.unwrap().is_none());
        // The cleanup also rewrote the file.
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw.trim(), "{}");
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_files_read_as_empty() {
        let (_dir, store) = store();
        assert!(store.get("anything").await.unwrap().is_none());

        tokio::fs::write(store.path(), "not json").await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_store_reopen() {
        let (_dir, store) = store();
        let until = Utc::now() + Duration::hours(1);
        store
            .set(
                "flyvictor",
                SourceState {
                    reason: "blocked".to_string(),
                    disabled_until: until,
                },
            )
            .await
            .unwrap();

        let reopened = JsonStateStore::new(store.path());
        let got = reopened.get("flyvictor").await.unwrap().unwrap();
        assert_eq!(got.disabled_until, until);
    }

    #[test]
    fn test_state_file_uses_camel_case() {
        let state = SourceState {
            reason: "r".to_string(),
            disabled_until: Utc::now(),
        };
        let raw = serde_json::to_string(&state).unwrap();
        assert!(raw.contains("disabledUntil"));
    }
}
