use super::fetcher::RateLimitedFetcher;
use crate::core::{LocatedPage, OrderId, OrderPage, Result, SamplePoint};
use std::collections::BTreeMap;

/// A fetched page together with where it sits in the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    /// Position of the first record on the page.
    pub start_position: u64,
    /// Token that fetched this page. `None` for the first page.
    pub cursor: Option<String>,
    pub page: OrderPage,
}

impl PageView {
    /// Position one past the last record.
    pub fn end_position(&self) -> u64 {
        self.start_position + self.page.len() as u64
    }

    pub fn covers(&self, position: u64) -> bool {
        position >= self.start_position && position < self.end_position()
    }

    /// Absolute position of `id` if the page holds it.
    pub fn position_of(&self, id: OrderId) -> Option<u64> {
        self.page
            .index_of(id)
            .map(|idx| self.start_position + idx as u64)
    }

    pub fn located(&self) -> Option<LocatedPage> {
        Some(LocatedPage {
            start_position: self.start_position,
            cursor: self.cursor.clone(),
            first_id: self.page.first_id()?,
            last_id: self.page.last_id()?,
        })
    }

    pub fn to_sample(&self) -> Option<SamplePoint> {
        Some(SamplePoint {
            position: self.start_position,
            min_id: self.page.min_id()?,
            max_id: self.page.max_id()?,
            cursor: self.cursor.clone(),
            record_count: self.page.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The returned page covers the requested position.
    Reached(PageView),
    /// The sequence ended before the requested position.
    EndOfSequence { last: Option<PageView>, total: u64 },
    /// The call budget ran out first.
    BudgetExhausted { last: Option<PageView> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkResult {
    pub outcome: WalkOutcome,
    pub calls_used: u64,
}

/// Drives the fetcher forward through the listing.
///
/// The walker can only move forward. It keeps an anchor table of every page
/// start whose cursor it has seen, so moving back restarts at the closest
/// anchor at or before the target instead of at position 0.
pub struct CursorWalker<'a> {
    fetcher: RateLimitedFetcher<'a>,
    anchors: BTreeMap<u64, Option<String>>,
    current: Option<PageView>,
    tail: Option<PageView>,
    next_position: u64,
    next_cursor: Option<String>,
    exhausted: bool,
    known_total: Option<u64>,
}

impl<'a> CursorWalker<'a> {
    pub fn new(fetcher: RateLimitedFetcher<'a>) -> Self {
        let mut anchors = BTreeMap::new();
        anchors.insert(0, None);
        Self {
            fetcher,
            anchors,
            current: None,
            tail: None,
            next_position: 0,
            next_cursor: None,
            exhausted: false,
            known_total: None,
        }
    }

    /// Logical API calls issued through this walker.
    pub fn calls(&self) -> u64 {
        self.fetcher.calls()
    }

    pub fn rate_limited(&self) -> u64 {
        self.fetcher.rate_limited()
    }

    pub fn page_size(&self) -> usize {
        self.fetcher.page_size()
    }

    pub fn current(&self) -> Option<&PageView> {
        self.current.as_ref()
    }

    /// Total record count, once the end of the sequence has been seen.
    pub fn known_total(&self) -> Option<u64> {
        self.known_total
    }

    /// The frontier has reached the end of the listing.
    pub fn at_end(&self) -> bool {
        self.exhausted
    }

    /// Registers a cursor known to fetch the page starting at `position`.
    pub fn add_anchor(&mut self, position: u64, cursor: Option<String>) {
        if position == 0 || cursor.is_some() {
            self.anchors.insert(position, cursor);
        }
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// Moves the frontier back to position 0.
    pub fn restart(&mut self) {
        self.current = None;
        self.next_position = 0;
        self.next_cursor = None;
        self.exhausted = matches!(self.known_total, Some(0));
    }

    /// Fetches the page at the frontier. `None` once the sequence has ended.
    pub async fn next_page(&mut self) -> Result<Option<PageView>> {
        if self.exhausted {
            return Ok(None);
        }

        // Frontier state changes only once the fetch succeeded.
        let cursor = self.next_cursor.clone();
        let page = self.fetcher.fetch(cursor.as_deref()).await?;
        if page.is_empty() {
            self.next_cursor = None;
            self.mark_end(self.next_position);
            return Ok(None);
        }

        let view = PageView {
            start_position: self.next_position,
            cursor: cursor.clone(),
            page,
        };
        self.anchors.insert(view.start_position, cursor);
        self.next_position = view.end_position();
        self.next_cursor = view
            .page
            .next_cursor
            .clone()
            .filter(|c| !c.is_empty());
        self.current = Some(view.clone());

        match &self.next_cursor {
            Some(next) => {
                self.anchors.insert(self.next_position, Some(next.clone()));
            }
            None => self.mark_end(self.next_position),
        }
        Ok(Some(view))
    }

    /// Fetches the page behind `cursor` without moving the frontier.
    pub async fn probe(&mut self, cursor: Option<&str>) -> Result<OrderPage> {
        self.fetcher.fetch(cursor).await
    }

    /// Walks until the loaded page covers `target`, spending at most
    /// `max_calls` fetches.
    pub async fn advance_to(&mut self, target: u64, max_calls: u64) -> Result<WalkResult> {
        let start_calls = self.calls();

        if let Some(view) = self.current.as_ref().filter(|v| v.covers(target)) {
            return Ok(WalkResult {
                outcome: WalkOutcome::Reached(view.clone()),
                calls_used: 0,
            });
        }

        if let Some(total) = self.known_total.filter(|&total| target >= total) {
            return Ok(WalkResult {
                outcome: WalkOutcome::EndOfSequence {
                    last: self.tail.clone(),
                    total,
                },
                calls_used: 0,
            });
        }

        self.seek(target);

        loop {
            let used = self.calls() - start_calls;
            if used >= max_calls {
                return Ok(WalkResult {
                    outcome: WalkOutcome::BudgetExhausted {
                        last: self.current.clone(),
                    },
                    calls_used: used,
                });
            }

            match self.next_page().await? {
                Some(view) if view.covers(target) => {
                    return Ok(WalkResult {
                        outcome: WalkOutcome::Reached(view),
                        calls_used: self.calls() - start_calls,
                    });
                }
                Some(_) => continue,
                None => {
                    return Ok(WalkResult {
                        outcome: WalkOutcome::EndOfSequence {
                            last: self.tail.clone(),
                            total: self.known_total.unwrap_or(self.next_position),
                        },
                        calls_used: self.calls() - start_calls,
                    });
                }
            }
        }
    }

    /// Repositions the frontier at the best anchor for `target`, unless the
    /// frontier is already closer.
    fn seek(&mut self, target: u64) {
        let frontier_usable = self.next_position <= target && !self.exhausted;
        let Some((&position, cursor)) = self.anchors.range(..=target).next_back() else {
            return;
        };
        if frontier_usable && position <= self.next_position {
            return;
        }

        self.next_position = position;
        self.next_cursor = cursor.clone();
        self.current = None;
        self.exhausted = self.known_total.is_some_and(|total| position >= total);
    }

    fn mark_end(&mut self, total: u64) {
        self.exhausted = true;
        self.known_total = Some(total);
        self.anchors.remove(&total);
        if self.current.as_ref().is_some_and(|v| v.end_position() == total) {
            self.tail = self.current.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitPolicy;
    use crate::observer::NoopObserver;
    use crate::core::RecoveryError;
    use crate::source::{InMemoryOrderSource, ScriptedFailure};

    fn walker(source: &InMemoryOrderSource, page_size: usize) -> CursorWalker<'_> {
        CursorWalker::new(RateLimitedFetcher::new(
            source,
            "s",
            page_size,
            RateLimitPolicy::flat(1, 1),
            &NoopObserver,
        ))
    }

    #[tokio::test]
    async fn test_advance_reaches_covering_page() {
        let source = InMemoryOrderSource::descending(1000, 100);
        let mut walker = walker(&source, 10);

        let result = walker.advance_to(35, 100).await.unwrap();
        let WalkOutcome::Reached(view) = result.outcome else {
            panic!("expected to reach position 35");
        };
        assert_eq!(view.start_position, 30);
        assert_eq!(view.position_of(965), Some(35));
        assert_eq!(result.calls_used, 4);

        // Same page again costs nothing.
        let again = walker.advance_to(39, 100).await.unwrap();
        assert_eq!(again.calls_used, 0);
    }

    #[tokio::test]
    async fn test_backward_move_uses_anchor() {
        let source = InMemoryOrderSource::descending(1000, 100);
        let mut walker = walker(&source, 10);

        walker.advance_to(75, 100).await.unwrap();
        assert_eq!(walker.calls(), 8);

        let back = walker.advance_to(42, 100).await.unwrap();
        assert_eq!(back.calls_used, 1);
        let WalkOutcome::Reached(view) = back.outcome else {
            panic!("expected to reach position 42");
        };
        assert_eq!(view.start_position, 40);
        assert_eq!(view.cursor.as_deref(), Some("c40"));
    }

    #[tokio::test]
    async fn test_seeded_anchor_skips_the_walk() {
        let source = InMemoryOrderSource::descending(1000, 100);
        let mut walker = walker(&source, 10);
        walker.add_anchor(60, Some("c60".to_string()));
        walker.add_anchor(70, None);
        assert_eq!(walker.anchor_count(), 2);

        let result = walker.advance_to(65, 100).await.unwrap();
        assert_eq!(result.calls_used, 1);
        let WalkOutcome::Reached(view) = result.outcome else {
            panic!("expected to reach position 65");
        };
        assert_eq!(view.position_of(935), Some(65));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_frontier_cursor() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 10);
        walker.next_page().await.unwrap();
        source.push_failure(ScriptedFailure::Transport).await;

        assert!(matches!(
            walker.next_page().await,
            Err(RecoveryError::Transport(_))
        ));

        let result = walker.advance_to(25, 100).await.unwrap();
        let WalkOutcome::Reached(view) = result.outcome else {
            panic!("expected to reach position 25");
        };
        assert_eq!(view.start_position, 20);
        assert_eq!(view.cursor.as_deref(), Some("c20"));
        assert_eq!(view.page.first_id(), Some(5180));
        assert_eq!(view.position_of(5200), None);
        assert_eq!(view.position_of(5175), Some(25));

        // The anchor for position 10 still resumes mid-listing.
        walker.restart();
        let back = walker.advance_to(12, 100).await.unwrap();
        let WalkOutcome::Reached(view) = back.outcome else {
            panic!("expected to reach position 12");
        };
        assert_eq!(view.page.first_id(), Some(5190));
    }

    #[tokio::test]
    async fn test_budget_is_respected() {
        let source = InMemoryOrderSource::descending(1000, 100);
        let mut walker = walker(&source, 10);

        let result = walker.advance_to(95, 3).await.unwrap();
        assert!(matches!(result.outcome, WalkOutcome::BudgetExhausted { .. }));
        assert_eq!(result.calls_used, 3);
        assert_eq!(source.requests(), 3);
    }

    #[tokio::test]
    async fn test_end_of_sequence_reports_tail() {
        let source = InMemoryOrderSource::descending(1000, 25);
        let mut walker = walker(&source, 10);

        let result = walker.advance_to(40, 100).await.unwrap();
        let WalkOutcome::EndOfSequence { last, total } = result.outcome else {
            panic!("expected end of sequence");
        };
        assert_eq!(total, 25);
        assert_eq!(last.unwrap().start_position, 20);
        assert_eq!(walker.known_total(), Some(25));

        // Known end: no further calls.
        let again = walker.advance_to(60, 100).await.unwrap();
        assert_eq!(again.calls_used, 0);
    }

    #[tokio::test]
    async fn test_restart_walks_from_zero() {
        let source = InMemoryOrderSource::descending(1000, 30);
        let mut walker = walker(&source, 10);
        walker.advance_to(25, 100).await.unwrap();

        walker.restart();
        let first = walker.next_page().await.unwrap().unwrap();
        assert_eq!(first.start_position, 0);
        assert_eq!(first.page.first_id(), Some(1000));
    }
}
