use super::clock::expiry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Remote order identifiers are positive integers assigned in creation order.
pub type OrderId = u64;

/// Connection settings for one remote shop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub identifier: String,
    #[serde(alias = "base_url")]
    pub base_url: String,
    #[serde(alias = "api_token")]
    pub api_token: String,
    #[serde(default = "default_active", alias = "is_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl StoreConfig {
    pub fn new(identifier: &str, base_url: &str, api_token: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            base_url: base_url.to_string(),
            api_token: api_token.to_string(),
            is_active: true,
        }
    }

    /// Mark the store inactive so batch runs skip it
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("identifier", &self.identifier)
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// One order as returned inside a page of the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrderRecord {
    pub id: OrderId,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default, alias = "stateName")]
    pub state_name: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

impl RemoteOrderRecord {
    pub fn new(id: OrderId) -> Self {
        Self {
            id,
            reference: None,
            state_name: None,
            created_at: None,
        }
    }
}

/// A single page of the newest-first order listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPage {
    pub records: Vec<RemoteOrderRecord>,
    pub next_cursor: Option<String>,
}

impl OrderPage {
    pub fn new(records: Vec<RemoteOrderRecord>, next_cursor: Option<String>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest id on the page.
    pub fn max_id(&self) -> Option<OrderId> {
        self.records.iter().map(|r| r.id).max()
    }

    /// Oldest id on the page.
    pub fn min_id(&self) -> Option<OrderId> {
        self.records.iter().map(|r| r.id).min()
    }

    pub fn first_id(&self) -> Option<OrderId> {
        self.records.first().map(|r| r.id)
    }

    pub fn last_id(&self) -> Option<OrderId> {
        self.records.last().map(|r| r.id)
    }

    /// Index of the record carrying `id`, if any.
    pub fn index_of(&self, id: OrderId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

/// ID range observed at one sampled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePoint {
    /// Position of the first record on the sampled page.
    pub position: u64,
    pub min_id: OrderId,
    pub max_id: OrderId,
    /// Token that re-fetches the sampled page. `None` for the first page.
    pub cursor: Option<String>,
    pub record_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMethod {
    Binary,
    Sweep,
    Exhaustive,
    NotFound,
    Error,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Binary => "BINARY",
            SearchMethod::Sweep => "SWEEP",
            SearchMethod::Exhaustive => "EXHAUSTIVE",
            SearchMethod::NotFound => "NOT_FOUND",
            SearchMethod::Error => "ERROR",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Exact,
    High,
    Medium,
    Low,
    NotFound,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confidence::Exact => "EXACT",
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::NotFound => "NOT_FOUND",
        };
        f.pad(name)
    }
}

/// The page a search settled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedPage {
    pub start_position: u64,
    pub cursor: Option<String>,
    pub first_id: OrderId,
    pub last_id: OrderId,
}

/// Result of one strategy, or of a whole per-store recovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub found: bool,
    /// Exact position when found, otherwise the best known position.
    pub exact_position: Option<u64>,
    pub total_api_calls: u64,
    pub method: SearchMethod,
    pub confidence: Confidence,
    pub page: Option<LocatedPage>,
}

impl SearchOutcome {
    pub fn found(position: u64, calls: u64, method: SearchMethod, page: LocatedPage) -> Self {
        Self {
            found: true,
            exact_position: Some(position),
            total_api_calls: calls,
            method,
            confidence: Confidence::Exact,
            page: Some(page),
        }
    }

    pub fn not_found(position: Option<u64>, calls: u64, confidence: Confidence) -> Self {
        Self {
            found: false,
            exact_position: position,
            total_api_calls: calls,
            method: SearchMethod::NotFound,
            confidence,
            page: None,
        }
    }

    pub fn error(calls: u64) -> Self {
        Self {
            found: false,
            exact_position: None,
            total_api_calls: calls,
            method: SearchMethod::Error,
            confidence: Confidence::NotFound,
            page: None,
        }
    }

    pub fn with_page(mut self, page: Option<LocatedPage>) -> Self {
        self.page = page;
        self
    }

    /// 1-based page number for the resolved position.
    pub fn page_number(&self, page_size: usize) -> Option<u64> {
        self.exact_position.map(|p| page_number(p, page_size))
    }
}

/// 1-based page holding the record at zero-based `position`.
pub fn page_number(position: u64, page_size: usize) -> u64 {
    position / page_size.max(1) as u64 + 1
}

/// Persisted resume point for the incremental order sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub store_identifier: String,
    pub target_id: OrderId,
    pub last_page: u64,
    pub first_id: Option<OrderId>,
    pub last_id: Option<OrderId>,
    pub position: u64,
    pub cursor: Option<String>,
    pub confidence: Confidence,
    pub method: SearchMethod,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl Bookmark {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expiry(self.timestamp, Duration::from_secs(self.ttl_seconds)) <= now
    }
}
