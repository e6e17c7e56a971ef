//! The local side of the sync: which order ids are already stored here.

use crate::core::{OrderId, RecoveryError, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// Query for the newest order already synced for a store.
pub trait LocalOrderIndex: Send + Sync {
    /// Largest known local order id, `None` when nothing was synced yet.
    fn max_order_id(&self, store_identifier: &str) -> Result<Option<OrderId>>;
}

/// Fixed store → max id map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticOrderIndex {
    ids: HashMap<String, OrderId>,
}

impl StaticOrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store_identifier: &str, max_id: OrderId) -> Self {
        self.ids.insert(store_identifier.to_string(), max_id);
        self
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<HashMap<String, OrderId>> for StaticOrderIndex {
    fn from(ids: HashMap<String, OrderId>) -> Self {
        Self { ids }
    }
}

impl LocalOrderIndex for StaticOrderIndex {
    fn max_order_id(&self, store_identifier: &str) -> Result<Option<OrderId>> {
        Ok(self.ids.get(store_identifier).copied())
    }
}

/// Loads a `{"store": maxId, ...}` JSON export of the local database.
pub async fn load_local_index(path: &Path) -> Result<StaticOrderIndex> {
    let raw = fs::read_to_string(path).await.map_err(|err| {
        RecoveryError::LocalIndex(format!(
            "Failed to read local index '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ids: HashMap<String, OrderId> = serde_json::from_str(&raw).map_err(|err| {
        RecoveryError::LocalIndex(format!(
            "Failed to parse local index '{}': {}",
            path.display(),
            err
        ))
    })?;
    Ok(StaticOrderIndex::from(ids))
}
