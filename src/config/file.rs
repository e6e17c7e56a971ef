use super::RecoveryConfig;
use crate::core::{RecoveryError, Result, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// On-disk batch description: the stores to reconcile and optional tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl BatchFile {
    pub fn active_stores(&self) -> Vec<StoreConfig> {
        self.stores.iter().filter(|s| s.is_active).cloned().collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.recovery.validate().map_err(RecoveryError::Config)?;
        for store in &self.stores {
            if store.identifier.trim().is_empty() {
                return Err(RecoveryError::Config(
                    "store identifier must not be empty".to_string(),
                ));
            }
            if store.is_active && store.base_url.trim().is_empty() {
                return Err(RecoveryError::Config(format!(
                    "store '{}' has no base URL",
                    store.identifier
                )));
            }
        }
        Ok(())
    }
}

/// Reads and validates a batch file.
pub async fn load_batch_file(path: &Path) -> Result<BatchFile> {
    let raw = fs::read_to_string(path).await.map_err(|err| {
        RecoveryError::Config(format!(
            "Failed to read batch file '{}': {}",
            path.display(),
            err
        ))
    })?;
    let batch: BatchFile = serde_json::from_str(&raw).map_err(|err| {
        RecoveryError::Config(format!(
            "Failed to parse batch file '{}': {}",
            path.display(),
            err
        ))
    })?;
    batch.validate()?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_batch_file_filters_inactive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stores.json");
        std::fs::write(
            &path,
            r#"{
                "stores": [
                    {"identifier": "a", "baseUrl": "http://a", "apiToken": "t1"},
                    {"identifier": "b", "baseUrl": "http://b", "apiToken": "t2", "isActive": false}
                ],
                "recovery": {"page_size": 25}
            }"#,
        )
        .unwrap();

        let batch = load_batch_file(&path).await.unwrap();
        assert_eq!(batch.recovery.page_size, 25);
        let active = batch.active_stores();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].identifier, "a");
    }

    #[tokio::test]
    async fn test_load_batch_file_rejects_bad_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stores.json");
        std::fs::write(&path, r#"{"stores": [], "recovery": {"page_size": 0}}"#).unwrap();

        let err = load_batch_file(&path).await.unwrap_err();
        assert!(matches!(err, RecoveryError::Config(_)));

        let missing = load_batch_file(&dir.path().join("missing.json")).await.unwrap_err();
        assert!(matches!(missing, RecoveryError::Config(_)));
    }
}
