mod file;

pub use file::{BatchFile, load_batch_file};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bookmarks expire after a week unless configured otherwise.
pub const DEFAULT_BOOKMARK_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Backoff policy for HTTP 429 responses.
///
/// Delays start at `base_backoff_ms` and double per attempt up to
/// `max_backoff_ms`. Setting both to the same value gives a flat sleep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Total attempts per logical fetch, the first one included.
    pub max_attempts: usize,
    /// Base duration in milliseconds for backoff calculation.
    pub base_backoff_ms: u64,
    /// Maximum duration in milliseconds for backoff.
    pub max_backoff_ms: u64,
    /// Prefer the server's `Retry-After` hint when present.
    pub honor_retry_after: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            honor_retry_after: true,
        }
    }
}

impl RateLimitPolicy {
    /// Same delay before every retry.
    pub fn flat(delay_ms: u64, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: delay_ms,
            max_backoff_ms: delay_ms,
            honor_retry_after: false,
        }
    }

    /// Doubling delays from `base_ms` up to `max_ms`.
    pub fn escalating(base_ms: u64, max_ms: u64, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: base_ms,
            max_backoff_ms: max_ms,
            honor_retry_after: false,
        }
    }

    /// Returns `true` when another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Computes the exponential backoff in milliseconds for the given 1-based attempt.
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = self.base_backoff_ms;
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }

    /// Delay before the retry following `attempt`, honoring a server hint.
    pub fn delay_for(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_backoff_ms.max(self.base_backoff_ms));
        match retry_after {
            Some(hint) if self.honor_retry_after => hint.min(cap),
            _ => Duration::from_millis(self.backoff_ms(attempt)),
        }
    }
}

/// Tuning knobs for one recovery run.
///
/// Call budgets are counted in page fetches against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Records requested per page (`per_page`)
    pub page_size: usize,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// HTTP 429 handling
    pub rate_limit: RateLimitPolicy,

    /// Positions sampled to build the ID density model
    pub checkpoints: Vec<u64>,

    /// Fetch budget for the whole sampling phase
    pub sampling_max_calls: u64,

    /// Probe cap of the binary navigator
    pub binary_max_iterations: usize,

    /// Fetch budget for a single binary probe
    pub probe_max_calls: u64,

    /// Half-width of the precise search window, in records
    pub window_radius: u64,

    /// Fetch budget for one precise window scan
    pub window_max_calls: u64,

    /// Records the cursor sweep starts before the estimate
    pub sweep_margin: u64,

    /// Fetch budget for the cursor sweep
    pub sweep_max_calls: u64,

    /// Fetch budget for the exhaustive sweep
    pub exhaustive_max_calls: u64,

    /// Bookmark lifetime in seconds
    pub bookmark_ttl_secs: u64,

    /// Reuse a stored bookmark after verifying its page still holds the target
    pub reuse_valid_bookmarks: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            request_timeout_secs: 30,
            rate_limit: RateLimitPolicy::default(),
            checkpoints: vec![0, 200, 1_000, 2_000, 4_000],
            sampling_max_calls: 250,
            binary_max_iterations: 15,
            probe_max_calls: 100,
            window_radius: 40,
            window_max_calls: 10,
            sweep_margin: 100,
            sweep_max_calls: 50,
            exhaustive_max_calls: 1_000,
            bookmark_ttl_secs: DEFAULT_BOOKMARK_TTL_SECS,
            reuse_valid_bookmarks: false,
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the rate-limit policy
    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = policy;
        self
    }

    /// Set the sampling checkpoints
    pub fn checkpoints(mut self, checkpoints: Vec<u64>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Set the sampling budget
    pub fn sampling_max_calls(mut self, calls: u64) -> Self {
        self.sampling_max_calls = calls;
        self
    }

    /// Set the binary probe cap
    pub fn binary_max_iterations(mut self, iterations: usize) -> Self {
        self.binary_max_iterations = iterations;
        self
    }

    /// Set the per-probe budget
    pub fn probe_max_calls(mut self, calls: u64) -> Self {
        self.probe_max_calls = calls;
        self
    }

    /// Set the precise window radius and budget
    pub fn window(mut self, radius: u64, max_calls: u64) -> Self {
        self.window_radius = radius;
        self.window_max_calls = max_calls;
        self
    }

    /// Set the cursor sweep margin and budget
    pub fn sweep(mut self, margin: u64, max_calls: u64) -> Self {
        self.sweep_margin = margin;
        self.sweep_max_calls = max_calls;
        self
    }

    /// Set the exhaustive sweep budget
    pub fn exhaustive_max_calls(mut self, calls: u64) -> Self {
        self.exhaustive_max_calls = calls;
        self
    }

    /// Set the bookmark TTL
    pub fn bookmark_ttl(mut self, ttl: Duration) -> Self {
        self.bookmark_ttl_secs = ttl.as_secs();
        self
    }

    /// Reuse verified bookmarks instead of re-deriving them
    pub fn reuse_valid_bookmarks(mut self, reuse: bool) -> Self {
        self.reuse_valid_bookmarks = reuse;
        self
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be > 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }

        if self.rate_limit.max_attempts == 0 {
            return Err("rate_limit.max_attempts must be > 0".to_string());
        }

        if self.binary_max_iterations == 0 {
            return Err("binary_max_iterations must be > 0".to_string());
        }

        if self.exhaustive_max_calls == 0 {
            return Err("exhaustive_max_calls must be > 0".to_string());
        }

        if self.bookmark_ttl_secs == 0 {
            return Err("bookmark_ttl_secs must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.binary_max_iterations, 15);
        assert_eq!(config.window_max_calls, 10);
        assert_eq!(config.bookmark_ttl_secs, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RecoveryConfig::new()
            .page_size(50)
            .window(100, 4)
            .sweep(10, 7)
            .exhaustive_max_calls(3);

        assert_eq!(config.page_size, 50);
        assert_eq!(config.window_radius, 100);
        assert_eq!(config.window_max_calls, 4);
        assert_eq!(config.sweep_max_calls, 7);
        assert_eq!(config.exhaustive_max_calls, 3);
    }

    #[test]
    fn test_validate() {
        assert!(RecoveryConfig::new().page_size(0).validate().is_err());
        assert!(RecoveryConfig::new().binary_max_iterations(0).validate().is_err());
        assert!(
            RecoveryConfig::new()
                .rate_limit(RateLimitPolicy::flat(10, 0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_escalating_backoff_doubles_up_to_cap() {
        let policy = RateLimitPolicy::escalating(1_000, 5_000, 5);
        assert_eq!(policy.backoff_ms(1), 1_000);
        assert_eq!(policy.backoff_ms(2), 2_000);
        assert_eq!(policy.backoff_ms(3), 4_000);
        assert_eq!(policy.backoff_ms(4), 5_000);
    }

    #[test]
    fn test_flat_backoff() {
        let policy = RateLimitPolicy::flat(60_000, 3);
        assert_eq!(policy.backoff_ms(1), 60_000);
        assert_eq!(policy.backoff_ms(3), 60_000);
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_retry_after_hint_is_clamped() {
        let mut policy = RateLimitPolicy::escalating(100, 1_000, 3);
        policy.honor_retry_after = true;
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_millis(1_000)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_millis(250))),
            Duration::from_millis(250)
        );
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(200));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RecoveryConfig =
            serde_json::from_str(r#"{"page_size": 50, "rate_limit": {"max_attempts": 5}}"#)
                .unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.rate_limit.base_backoff_ms, 5_000);
        assert_eq!(config.binary_max_iterations, 15);
    }
}
