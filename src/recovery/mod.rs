//! Per-store recovery runs and the batch job around them.
//!
//! A run escalates through sampling, binary search, a cursor sweep around
//! the best estimate and finally an exhaustive sweep. All phases share one
//! [`CursorWalker`], so cursors learned early are reused later and the call
//! count covers the whole run. A phase error is reported to the observer and
//! the run moves on; only an error in the exhaustive sweep fails the store.

mod report;

pub use report::{BatchReport, ReportRow};

use crate::bookmark::{BookmarkStore, load_bookmark, save_bookmark};
use crate::config::RecoveryConfig;
use crate::core::{
    Bookmark, Clock, Confidence, LocatedPage, OrderId, RecoveryError, Result, SamplePoint,
    SearchMethod, SearchOutcome, StoreConfig, SystemClock, page_number,
};
use crate::local::LocalOrderIndex;
use crate::navigation::{
    BinarySearchNavigator, CursorSweep, CursorWalker, DistributionSampler, ExhaustiveSweep,
    RateLimitedFetcher, WindowedSearch, estimate_position, search_bounds,
};
use crate::observer::{NoopObserver, RecoveryObserver, RecoveryPhase};
use crate::source::{OrderPageSource, SourceFactory};
use std::sync::Arc;

/// Result of recovering one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecovery {
    pub store_identifier: String,
    pub target_id: OrderId,
    pub outcome: SearchOutcome,
    /// Bookmark written (or reused) for this run.
    pub bookmark: Option<Bookmark>,
    pub samples: Vec<SamplePoint>,
    pub estimate: u64,
    pub reused_bookmark: bool,
    /// 429 responses absorbed by retries.
    pub rate_limited: u64,
}

pub struct RecoveryOrchestrator {
    config: RecoveryConfig,
    bookmarks: Arc<dyn BookmarkStore>,
    local_index: Arc<dyn LocalOrderIndex>,
    sources: Arc<dyn SourceFactory>,
    observer: Arc<dyn RecoveryObserver>,
    clock: Arc<dyn Clock>,
}

impl RecoveryOrchestrator {
    pub fn new(
        config: RecoveryConfig,
        bookmarks: Arc<dyn BookmarkStore>,
        local_index: Arc<dyn LocalOrderIndex>,
        sources: Arc<dyn SourceFactory>,
    ) -> Self {
        Self {
            config,
            bookmarks,
            local_index,
            sources,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RecoveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Locates `target` in the listing of `source` and writes the bookmark.
    pub async fn recover(
        &self,
        store: &str,
        source: &dyn OrderPageSource,
        target: OrderId,
    ) -> Result<StoreRecovery> {
        self.config.validate().map_err(RecoveryError::Config)?;
        let config = &self.config;
        let observer = self.observer.as_ref();

        let mut walker = CursorWalker::new(RateLimitedFetcher::new(
            source,
            store,
            config.page_size,
            config.rate_limit.clone(),
            observer,
        ));

        if config.reuse_valid_bookmarks {
            if let Some(recovery) = self.reuse_bookmark(store, &mut walker, target).await {
                return Ok(recovery);
            }
        }

        observer.phase_started(store, RecoveryPhase::Sampling);
        let run = DistributionSampler::new(&config.checkpoints, config.sampling_max_calls)
            .sample(&mut walker)
            .await;
        match &run.interrupted {
            Some(err) => observer.phase_failed(store, RecoveryPhase::Sampling, err),
            None => observer.phase_finished(store, RecoveryPhase::Sampling, false, run.calls),
        }
        let samples = run.points;
        let estimate = estimate_position(&samples, target);
        let (lower, upper) = search_bounds(&samples, target, config.page_size);

        let mut best: Option<SearchOutcome> = None;

        observer.phase_started(store, RecoveryPhase::BinarySearch);
        let navigator = BinarySearchNavigator::new(
            config.binary_max_iterations,
            config.probe_max_calls,
            WindowedSearch::new(config.window_radius, config.window_max_calls),
        );
        let phase_start = walker.calls();
        match navigator.search(&mut walker, lower, upper, target).await {
            Ok(report) => {
                let found = report.outcome.found;
                observer.phase_finished(
                    store,
                    RecoveryPhase::BinarySearch,
                    found,
                    walker.calls() - phase_start,
                );
                if found {
                    let recovery =
                        assemble(store, target, report.outcome, &walker, samples, estimate);
                    return self.persist(recovery).await;
                }
                best = Some(report.outcome);
            }
            Err(err) => observer.phase_failed(store, RecoveryPhase::BinarySearch, &err),
        }

        observer.phase_started(store, RecoveryPhase::CursorSweep);
        let center = best
            .as_ref()
            .and_then(|o| o.exact_position)
            .unwrap_or(estimate);
        let phase_start = walker.calls();
        match CursorSweep::new(config.sweep_margin, config.sweep_max_calls)
            .sweep(&mut walker, center, target)
            .await
        {
            Ok(scan) => {
                observer.phase_finished(
                    store,
                    RecoveryPhase::CursorSweep,
                    scan.found(),
                    walker.calls() - phase_start,
                );
                if let Some(candidate) = scan.insertion_outcome(walker.calls(), Confidence::High) {
                    best = Some(prefer(best, candidate));
                }
                if let Some(outcome) = scan.into_found(SearchMethod::Sweep, walker.calls()) {
                    let recovery = assemble(store, target, outcome, &walker, samples, estimate);
                    return self.persist(recovery).await;
                }
            }
            Err(err) => observer.phase_failed(store, RecoveryPhase::CursorSweep, &err),
        }

        observer.phase_started(store, RecoveryPhase::ExhaustiveSearch);
        let phase_start = walker.calls();
        let scan = match ExhaustiveSweep::new(config.exhaustive_max_calls)
            .sweep(&mut walker, target)
            .await
        {
            Ok(scan) => scan,
            Err(err) => {
                observer.phase_failed(store, RecoveryPhase::ExhaustiveSearch, &err);
                return Err(err);
            }
        };
        observer.phase_finished(
            store,
            RecoveryPhase::ExhaustiveSearch,
            scan.found(),
            walker.calls() - phase_start,
        );

        let total = walker.calls();
        let proven_absent = scan.end_of_sequence && !scan.found();
        let insertion = scan.insertion_outcome(
            total,
            if proven_absent {
                Confidence::NotFound
            } else {
                Confidence::High
            },
        );
        if let Some(outcome) = scan.into_found(SearchMethod::Exhaustive, total) {
            let recovery = assemble(store, target, outcome, &walker, samples, estimate);
            return self.persist(recovery).await;
        }

        let outcome = if proven_absent {
            // Older than every record: it would sit one past the end.
            insertion.unwrap_or_else(|| {
                SearchOutcome::not_found(
                    Some(walker.known_total().unwrap_or(0)),
                    total,
                    Confidence::NotFound,
                )
            })
        } else {
            let candidate = match (best, insertion) {
                (Some(best), Some(insertion)) => Some(prefer(Some(best), insertion)),
                (best, insertion) => best.or(insertion),
            };
            candidate.unwrap_or_else(|| SearchOutcome::not_found(Some(estimate), total, Confidence::Low))
        };

        let recovery = assemble(store, target, outcome, &walker, samples, estimate);
        self.persist(recovery).await
    }

    /// Recovers every active store, one after another.
    ///
    /// Per-store failures become `ERROR` rows. Fails only when the
    /// configuration is unusable or no store is active.
    pub async fn run_batch(&self, stores: &[StoreConfig]) -> Result<BatchReport> {
        self.config.validate().map_err(RecoveryError::Config)?;
        let active: Vec<&StoreConfig> = stores.iter().filter(|s| s.is_active).collect();
        if active.is_empty() {
            return Err(RecoveryError::Config(
                "No active store configurations".to_string(),
            ));
        }

        let mut report = BatchReport::new(self.config.page_size, self.clock.now());
        for store in active {
            let target = match self.target_for(store) {
                Ok(target) => target,
                Err(err) => {
                    self.observer.store_failed(&store.identifier, &err);
                    report.push(ReportRow::error(&store.identifier, None, &err));
                    continue;
                }
            };

            match self.recover_store(store, target).await {
                Ok(recovery) => {
                    report.push(ReportRow::from_recovery(&recovery, self.config.page_size))
                }
                Err(err) => {
                    self.observer.store_failed(&store.identifier, &err);
                    report.push(ReportRow::error(&store.identifier, Some(target), &err));
                }
            }
        }
        Ok(report)
    }

    async fn recover_store(&self, store: &StoreConfig, target: OrderId) -> Result<StoreRecovery> {
        let source = self.sources.open(store, &self.config)?;
        self.recover(&store.identifier, source.as_ref(), target)
            .await
    }

    fn target_for(&self, store: &StoreConfig) -> Result<OrderId> {
        self.local_index
            .max_order_id(&store.identifier)?
            .ok_or_else(|| {
                RecoveryError::LocalIndex(format!(
                    "No local orders recorded for store '{}'",
                    store.identifier
                ))
            })
    }

    async fn reuse_bookmark(
        &self,
        store: &str,
        walker: &mut CursorWalker<'_>,
        target: OrderId,
    ) -> Option<StoreRecovery> {
        let observer = self.observer.as_ref();
        observer.phase_started(store, RecoveryPhase::BookmarkCheck);
        match self.verify_bookmark(store, walker, target).await {
            Ok(reused) => {
                observer.phase_finished(
                    store,
                    RecoveryPhase::BookmarkCheck,
                    reused.is_some(),
                    walker.calls(),
                );
                reused
            }
            Err(err) => {
                observer.phase_failed(store, RecoveryPhase::BookmarkCheck, &err);
                None
            }
        }
    }

    /// An exact bookmark for the same target is still valid when its cursor
    /// page holds the target. Costs one fetch.
    async fn verify_bookmark(
        &self,
        store: &str,
        walker: &mut CursorWalker<'_>,
        target: OrderId,
    ) -> Result<Option<StoreRecovery>> {
        let Some(bookmark) = load_bookmark(self.bookmarks.as_ref(), store).await? else {
            return Ok(None);
        };
        if bookmark.target_id != target
            || bookmark.confidence != Confidence::Exact
            || bookmark.is_expired(self.clock.now())
        {
            return Ok(None);
        }

        let page = walker.probe(bookmark.cursor.as_deref()).await?;
        let (Some(index), Some(first_id), Some(last_id)) =
            (page.index_of(target), page.first_id(), page.last_id())
        else {
            return Ok(None);
        };
        let Some(start_position) = bookmark.position.checked_sub(index as u64) else {
            return Ok(None);
        };

        let located = LocatedPage {
            start_position,
            cursor: bookmark.cursor.clone(),
            first_id,
            last_id,
        };
        Ok(Some(StoreRecovery {
            store_identifier: store.to_string(),
            target_id: target,
            outcome: SearchOutcome::found(
                bookmark.position,
                walker.calls(),
                bookmark.method,
                located,
            ),
            estimate: bookmark.position,
            bookmark: Some(bookmark),
            samples: Vec::new(),
            reused_bookmark: true,
            rate_limited: walker.rate_limited(),
        }))
    }

    async fn persist(&self, mut recovery: StoreRecovery) -> Result<StoreRecovery> {
        let bookmark = self.bookmark_for(&recovery);
        save_bookmark(self.bookmarks.as_ref(), &bookmark).await?;
        self.observer.bookmark_written(&bookmark);
        recovery.bookmark = Some(bookmark);
        Ok(recovery)
    }

    fn bookmark_for(&self, recovery: &StoreRecovery) -> Bookmark {
        let outcome = &recovery.outcome;
        let position = outcome.exact_position.unwrap_or(recovery.estimate);
        let page = outcome.page.as_ref();
        Bookmark {
            store_identifier: recovery.store_identifier.clone(),
            target_id: recovery.target_id,
            last_page: page_number(position, self.config.page_size),
            first_id: page.map(|p| p.first_id),
            last_id: page.map(|p| p.last_id),
            position,
            cursor: page.and_then(|p| p.cursor.clone()),
            confidence: outcome.confidence,
            method: outcome.method,
            timestamp: self.clock.now(),
            ttl_seconds: self.config.bookmark_ttl_secs,
        }
    }
}

fn assemble(
    store: &str,
    target: OrderId,
    mut outcome: SearchOutcome,
    walker: &CursorWalker<'_>,
    samples: Vec<SamplePoint>,
    estimate: u64,
) -> StoreRecovery {
    outcome.total_api_calls = walker.calls();
    StoreRecovery {
        store_identifier: store.to_string(),
        target_id: target,
        outcome,
        bookmark: None,
        samples,
        estimate,
        reused_bookmark: false,
        rate_limited: walker.rate_limited(),
    }
}

/// Keeps the stronger of two unresolved outcomes, the earlier one on ties.
fn prefer(current: Option<SearchOutcome>, candidate: SearchOutcome) -> SearchOutcome {
    match current {
        Some(current) if strength(current.confidence) >= strength(candidate.confidence) => current,
        _ => candidate,
    }
}

fn strength(confidence: Confidence) -> u8 {
    match confidence {
        Confidence::Exact => 4,
        Confidence::High => 3,
        Confidence::Medium => 2,
        Confidence::Low => 1,
        Confidence::NotFound => 0,
    }
}
