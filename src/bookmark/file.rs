use super::BookmarkStore;
use crate::core::clock::expiry;
use crate::core::{Clock, RecoveryError, Result, SystemClock};
use crate::fs_utils::atomic_write;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    value: JsonValue,
    expires_at: DateTime<Utc>,
}

/// A [`BookmarkStore`] kept in one JSON document on disk.
///
/// Values that are valid JSON are stored inline so the file stays readable.
/// Every `set` rewrites the document through a temp file and rename.
pub struct FileBookmarkStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl FileBookmarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, FileEntry>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(RecoveryError::Bookmark(format!(
                    "Failed to read bookmark file '{}': {}",
                    self.path.display(),
                    err
                )));
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            RecoveryError::Bookmark(format!(
                "Failed to parse bookmark file '{}': {}",
                self.path.display(),
                err
            ))
        })
    }
}

#[async_trait]
impl BookmarkStore for FileBookmarkStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let entries = self.read_entries().await?;
        let Some(entry) = entries.get(key).filter(|e| e.expires_at > now) else {
            return Ok(None);
        };
        let value = match &entry.value {
            JsonValue::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut entries = self.read_entries().await?;
        entries.retain(|_, entry| entry.expires_at > now);

        let value = serde_json::from_str::<JsonValue>(&value)
            .ok()
            .filter(|v| !v.is_string())
            .unwrap_or(JsonValue::String(value));
        entries.insert(
            key.to_string(),
            FileEntry {
                value,
                expires_at: expiry(now, ttl),
            },
        );

        let bytes = serde_json::to_vec_pretty(&entries)?;
        atomic_write(&self.path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmark::{load_bookmark, save_bookmark};
    use crate::core::{Bookmark, Confidence, FixedClock, SearchMethod};
    use tempfile::TempDir;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn bookmark(now: DateTime<Utc>) -> Bookmark {
        Bookmark {
            store_identifier: "shop-a".to_string(),
            target_id: 5050,
            last_page: 8,
            first_id: Some(5060),
            last_id: Some(5041),
            position: 150,
            cursor: Some("c140".to_string()),
            confidence: Confidence::Exact,
            method: SearchMethod::Binary,
            timestamp: now,
            ttl_seconds: 3600,
        }
    }

    #[tokio::test]
    async fn test_bookmark_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bookmarks.json");
        let now = at("2026-01-01T00:00:00Z");
        let clock = Arc::new(FixedClock(now));

        let store = FileBookmarkStore::with_clock(&path, clock.clone());
        save_bookmark(&store, &bookmark(now)).await.unwrap();

        let reopened = FileBookmarkStore::with_clock(&path, clock);
        let loaded = load_bookmark(&reopened, "shop-a").await.unwrap().unwrap();
        assert_eq!(loaded, bookmark(now));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"lastPage\": 8"));
    }

    #[tokio::test]
    async fn test_expired_bookmark_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");
        let now = at("2026-01-01T00:00:00Z");

        let store = FileBookmarkStore::with_clock(&path, Arc::new(FixedClock(now)));
        save_bookmark(&store, &bookmark(now)).await.unwrap();

        let later = FileBookmarkStore::with_clock(
            &path,
            Arc::new(FixedClock(at("2026-01-01T02:00:00Z"))),
        );
        assert!(load_bookmark(&later, "shop-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plain_string_values() {
        let dir = TempDir::new().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("kv.json"));
        store
            .set("k", "hello".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileBookmarkStore::new(&path);
        assert!(matches!(
            store.get("k").await,
            Err(RecoveryError::Bookmark(_))
        ));
    }
}
