//! Persistence of recovered resume points.

mod file;
mod memory;

pub use file::FileBookmarkStore;
pub use memory::InMemoryBookmarkStore;

use crate::core::{Bookmark, RecoveryError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Key prefix for bookmark entries.
pub const BOOKMARK_KEY_PREFIX: &str = "order_bookmark:";

/// Key-value cache with per-entry expiry.
///
/// Expired entries read as absent. `set` overwrites atomically.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

pub fn bookmark_key(store_identifier: &str) -> String {
    format!("{}{}", BOOKMARK_KEY_PREFIX, store_identifier)
}

/// Reads and decodes the bookmark of one store.
pub async fn load_bookmark(
    store: &dyn BookmarkStore,
    store_identifier: &str,
) -> Result<Option<Bookmark>> {
    let Some(raw) = store.get(&bookmark_key(store_identifier)).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw).map(Some).map_err(|err| {
        RecoveryError::Bookmark(format!(
            "Stored bookmark for '{}' is unreadable: {}",
            store_identifier, err
        ))
    })
}

/// Encodes and writes a bookmark under its store key with its own TTL.
pub async fn save_bookmark(store: &dyn BookmarkStore, bookmark: &Bookmark) -> Result<()> {
    let value = serde_json::to_string(bookmark)?;
    store
        .set(
            &bookmark_key(&bookmark.store_identifier),
            value,
            Duration::from_secs(bookmark.ttl_seconds),
        )
        .await
}
