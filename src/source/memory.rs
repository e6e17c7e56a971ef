use super::{OrderPageSource, SourceFactory};
use crate::config::RecoveryConfig;
use crate::core::{OrderId, OrderPage, RecoveryError, RemoteOrderRecord, Result, StoreConfig};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A failure injected ahead of the next page requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    RateLimited(Option<Duration>),
    Http(u16),
    Transport,
}

/// An in-memory order listing that paginates like the remote API.
///
/// Cursors are opaque strings encoding the offset of the next page. Failures
/// queued with [`InMemoryOrderSource::push_failure`] are returned, one per
/// request, before any page is served. Failures pinned with
/// [`InMemoryOrderSource::fail_request`] replace the numbered request only.
#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    ids: Vec<OrderId>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    pinned: Mutex<HashMap<u64, ScriptedFailure>>,
    requests: AtomicU64,
}

impl InMemoryOrderSource {
    /// Serves `ids` in the given order.
    pub fn new(ids: Vec<OrderId>) -> Self {
        Self {
            ids,
            failures: Mutex::new(VecDeque::new()),
            pinned: Mutex::new(HashMap::new()),
            requests: AtomicU64::new(0),
        }
    }

    /// `count` consecutive ids counting down from `newest`.
    pub fn descending(newest: OrderId, count: usize) -> Self {
        let ids = (0..count as u64)
            .map_while(|offset| newest.checked_sub(offset))
            .collect();
        Self::new(ids)
    }

    /// Drops the given ids, leaving gaps as deleted orders would.
    pub fn without(mut self, removed: &[OrderId]) -> Self {
        self.ids.retain(|id| !removed.contains(id));
        self
    }

    pub fn ids(&self) -> &[OrderId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Zero-based rank of `id` in the listing.
    pub fn position_of(&self, id: OrderId) -> Option<u64> {
        self.ids.iter().position(|&i| i == id).map(|p| p as u64)
    }

    pub async fn push_failure(&self, failure: ScriptedFailure) {
        self.failures.lock().await.push_back(failure);
    }

    /// Fails the `request`-th request (1-based) with `failure`.
    pub async fn fail_request(&self, request: u64, failure: ScriptedFailure) {
        self.pinned.lock().await.insert(request, failure);
    }

    /// Queue `times` plain 429 responses.
    pub async fn rate_limit_next(&self, times: usize) {
        let mut failures = self.failures.lock().await;
        for _ in 0..times {
            failures.push_back(ScriptedFailure::RateLimited(None));
        }
    }

    /// Requests received so far, failed ones included.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn encode_cursor(offset: usize) -> String {
        format!("c{}", offset)
    }

    fn decode_cursor(cursor: &str) -> Result<usize> {
        cursor
            .strip_prefix('c')
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or_else(|| RecoveryError::Http {
                status: 400,
                message: format!("invalid cursor '{}'", cursor),
            })
    }
}

#[async_trait]
impl OrderPageSource for InMemoryOrderSource {
    async fn fetch_page(&self, cursor: Option<&str>, per_page: usize) -> Result<OrderPage> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        let pinned = self.pinned.lock().await.remove(&request);
        let failure = match pinned {
            Some(failure) => Some(failure),
            None => self.failures.lock().await.pop_front(),
        };
        if let Some(failure) = failure {
            return Err(match failure {
                ScriptedFailure::RateLimited(retry_after) => {
                    RecoveryError::RateLimited { retry_after }
                }
                ScriptedFailure::Http(status) => RecoveryError::Http {
                    status,
                    message: "scripted failure".to_string(),
                },
                ScriptedFailure::Transport => {
                    RecoveryError::Transport("connection reset".to_string())
                }
            });
        }

        let offset = match cursor {
            Some(cursor) => Self::decode_cursor(cursor)?,
            None => 0,
        };
        if offset >= self.ids.len() {
            return Ok(OrderPage::empty());
        }

        let end = (offset + per_page.max(1)).min(self.ids.len());
        let records = self.ids[offset..end]
            .iter()
            .map(|&id| RemoteOrderRecord::new(id))
            .collect();
        let next_cursor = (end < self.ids.len()).then(|| Self::encode_cursor(end));
        Ok(OrderPage::new(records, next_cursor))
    }
}

/// Hands out pre-registered in-memory sources by store identifier.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceFactory {
    sources: HashMap<String, Arc<InMemoryOrderSource>>,
}

impl MemorySourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, store: &str, source: Arc<InMemoryOrderSource>) -> Self {
        self.sources.insert(store.to_string(), source);
        self
    }
}

impl SourceFactory for MemorySourceFactory {
    fn open(
        &self,
        store: &StoreConfig,
        _config: &RecoveryConfig,
    ) -> Result<Box<dyn OrderPageSource>> {
        let source = self.sources.get(&store.identifier).cloned().ok_or_else(|| {
            RecoveryError::Config(format!(
                "No in-memory source registered for store '{}'",
                store.identifier
            ))
        })?;
        Ok(Box::new(source))
    }
}
