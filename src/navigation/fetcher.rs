use crate::config::RateLimitPolicy;
use crate::core::{OrderPage, RecoveryError, Result};
use crate::observer::RecoveryObserver;
use crate::source::OrderPageSource;
use tokio::time::sleep;

/// Wraps [`OrderPageSource::fetch_page`] with the 429 retry policy.
///
/// One call to [`RateLimitedFetcher::fetch`] is one logical API call however
/// many 429 retries it took; retries are counted separately.
pub struct RateLimitedFetcher<'a> {
    source: &'a dyn OrderPageSource,
    store: &'a str,
    page_size: usize,
    policy: RateLimitPolicy,
    observer: &'a dyn RecoveryObserver,
    calls: u64,
    rate_limited: u64,
}

impl<'a> RateLimitedFetcher<'a> {
    pub fn new(
        source: &'a dyn OrderPageSource,
        store: &'a str,
        page_size: usize,
        policy: RateLimitPolicy,
        observer: &'a dyn RecoveryObserver,
    ) -> Self {
        Self {
            source,
            store,
            page_size: page_size.max(1),
            policy,
            observer,
            calls: 0,
            rate_limited: 0,
        }
    }

    pub async fn fetch(&mut self, cursor: Option<&str>) -> Result<OrderPage> {
        self.calls += 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.source.fetch_page(cursor, self.page_size).await {
                Ok(page) => {
                    self.observer.page_fetched(self.store, cursor, page.len());
                    return Ok(page);
                }
                Err(RecoveryError::RateLimited { retry_after }) => {
                    self.rate_limited += 1;
                    if !self.policy.should_retry(attempt) {
                        return Err(RecoveryError::RateLimitExhausted { attempts: attempt });
                    }
                    let delay = self.policy.delay_for(attempt, retry_after);
                    self.observer.rate_limited(self.store, attempt, delay);
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Logical fetches issued so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// 429 responses received so far.
    pub fn rate_limited(&self) -> u64 {
        self.rate_limited
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
