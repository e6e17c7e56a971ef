use super::StoreRecovery;
use crate::core::{Confidence, OrderId, RecoveryError, Result, SearchMethod};
use crate::fs_utils::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One line of the batch diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub store_identifier: String,
    pub last_order_id: Option<OrderId>,
    /// 1-based page of the resolved position.
    pub resolved_page: Option<u64>,
    pub position: Option<u64>,
    pub total_api_calls: u64,
    pub found: bool,
    pub confidence: Option<Confidence>,
    pub method: SearchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportRow {
    pub fn from_recovery(recovery: &StoreRecovery, page_size: usize) -> Self {
        let outcome = &recovery.outcome;
        Self {
            store_identifier: recovery.store_identifier.clone(),
            last_order_id: Some(recovery.target_id),
            resolved_page: outcome.page_number(page_size),
            position: outcome.exact_position,
            total_api_calls: outcome.total_api_calls,
            found: outcome.found,
            confidence: Some(outcome.confidence),
            method: outcome.method,
            error: None,
        }
    }

    pub fn error(store_identifier: &str, last_order_id: Option<OrderId>, error: &RecoveryError) -> Self {
        Self {
            store_identifier: store_identifier.to_string(),
            last_order_id,
            resolved_page: None,
            position: None,
            total_api_calls: 0,
            found: false,
            confidence: None,
            method: SearchMethod::Error,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.method == SearchMethod::Error
    }
}

/// Diagnostics of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub page_size: usize,
    pub rows: Vec<ReportRow>,
}

impl BatchReport {
    pub fn new(page_size: usize, generated_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at,
            page_size,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn found_count(&self) -> usize {
        self.rows.iter().filter(|r| r.found).count()
    }

    pub fn error_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_error()).count()
    }

    pub fn row(&self, store_identifier: &str) -> Option<&ReportRow> {
        self.rows
            .iter()
            .find(|r| r.store_identifier == store_identifier)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Fixed-width text table, one line per store plus a summary line.
    pub fn render_table(&self) -> String {
        let store_width = self
            .rows
            .iter()
            .map(|r| r.store_identifier.len())
            .max()
            .unwrap_or(0)
            .max("STORE".len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<store_width$}  {:>10}  {:>6}  {:>8}  {:>6}  {:<5}  {:<10}  {:<10}  ERROR",
            "STORE", "LAST ID", "PAGE", "POSITION", "CALLS", "FOUND", "CONFIDENCE", "METHOD",
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:<store_width$}  {:>10}  {:>6}  {:>8}  {:>6}  {:<5}  {:<10}  {:<10}  {}",
                row.store_identifier,
                or_dash(row.last_order_id),
                or_dash(row.resolved_page),
                or_dash(row.position),
                row.total_api_calls,
                if row.found { "yes" } else { "no" },
                or_dash(row.confidence),
                row.method,
                row.error.as_deref().unwrap_or(""),
            );
        }
        let _ = write!(
            out,
            "{} stores, {} found, {} errors",
            self.rows.len(),
            self.found_count(),
            self.error_count()
        );
        out
    }

    /// Writes the JSON backup into `dir` and returns its path.
    pub async fn save_json(&self, dir: &Path) -> Result<PathBuf> {
        let name = format!(
            "order_recovery_{}_{}.json",
            self.generated_at.format("%Y%m%dT%H%M%SZ"),
            self.run_id.simple()
        );
        let path = dir.join(name);
        atomic_write(&path, self.to_json()?.as_bytes()).await?;
        Ok(path)
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn found_row() -> ReportRow {
        ReportRow {
            store_identifier: "shop-a".to_string(),
            last_order_id: Some(5050),
            resolved_page: Some(8),
            position: Some(150),
            total_api_calls: 21,
            found: true,
            confidence: Some(Confidence::Exact),
            method: SearchMethod::Binary,
            error: None,
        }
    }

    #[test]
    fn test_table_lists_every_row() {
        let mut report = BatchReport::new(20, Utc::now());
        report.push(found_row());
        report.push(ReportRow::error(
            "shop-b",
            None,
            &RecoveryError::Transport("connection refused".to_string()),
        ));

        let table = report.render_table();
        assert!(table.contains("shop-a"));
        assert!(table.contains("EXACT"));
        assert!(table.contains("connection refused"));
        assert!(table.ends_with("2 stores, 1 found, 1 errors"));
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut report = BatchReport::new(20, Utc::now());
        report.push(found_row());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"resolvedPage\": 8"));
        assert!(json.contains("\"totalApiCalls\": 21"));
        assert!(!json.contains("\"error\""));
    }

    #[tokio::test]
    async fn test_save_json_writes_backup() {
        let dir = TempDir::new().unwrap();
        let mut report = BatchReport::new(20, Utc::now());
        report.push(found_row());

        let path = report.save_json(dir.path()).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BatchReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }
}
