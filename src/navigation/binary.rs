use super::scan::Scanner;
use super::walker::{CursorWalker, PageView, WalkOutcome};
use super::window::WindowedSearch;
use crate::core::{Confidence, OrderId, Result, SearchMethod, SearchOutcome};

/// What the binary phase learned, found or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryReport {
    pub outcome: SearchOutcome,
    pub probes: usize,
    /// Probed page whose id range contains the target without holding it.
    pub bracket: Option<PageView>,
    pub lower: u64,
    pub upper: u64,
}

/// Narrows a position range by probing midpoints.
///
/// Probes compare the target with the id range of the page at the midpoint.
/// The listing is newest-first, so a target above the page range lies
/// earlier and one below it lies later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinarySearchNavigator {
    pub max_iterations: usize,
    pub probe_max_calls: u64,
    pub window: WindowedSearch,
}

impl BinarySearchNavigator {
    pub fn new(max_iterations: usize, probe_max_calls: u64, window: WindowedSearch) -> Self {
        Self {
            max_iterations,
            probe_max_calls,
            window,
        }
    }

    pub async fn search(
        &self,
        walker: &mut CursorWalker<'_>,
        lower: u64,
        upper: u64,
        target: OrderId,
    ) -> Result<BinaryReport> {
        let start_calls = walker.calls();
        let (mut lower, mut upper) = (lower, upper);
        let mut probes = 0;
        let mut bracket: Option<PageView> = None;
        let mut newer_than_all = false;

        while lower <= upper && probes < self.max_iterations {
            let mid = lower + (upper - lower) / 2;
            probes += 1;

            let walk = walker.advance_to(mid, self.probe_max_calls).await?;
            let view = match walk.outcome {
                WalkOutcome::Reached(view) => view,
                WalkOutcome::EndOfSequence {
                    last: Some(view),
                    total,
                } => {
                    upper = upper.min(total.saturating_sub(1));
                    view
                }
                WalkOutcome::EndOfSequence { last: None, .. }
                | WalkOutcome::BudgetExhausted { .. } => break,
            };

            if let (Some(position), Some(page)) = (view.position_of(target), view.located()) {
                let calls = walker.calls() - start_calls;
                return Ok(BinaryReport {
                    outcome: SearchOutcome::found(position, calls, SearchMethod::Binary, page),
                    probes,
                    bracket: None,
                    lower,
                    upper,
                });
            }

            let (Some(min_id), Some(max_id)) = (view.page.min_id(), view.page.max_id()) else {
                break;
            };

            if target > max_id {
                match view.start_position.checked_sub(1) {
                    Some(before) => upper = upper.min(before),
                    None => {
                        newer_than_all = true;
                        break;
                    }
                }
            } else if target < min_id {
                lower = lower.max(view.end_position());
            } else {
                bracket = Some(view);
                let scan = self.window.search_around(walker, mid, target).await?;
                let calls = walker.calls() - start_calls;
                if let Some(outcome) = scan.into_found(SearchMethod::Binary, calls) {
                    return Ok(BinaryReport {
                        outcome,
                        probes,
                        bracket: None,
                        lower,
                        upper,
                    });
                }
                break;
            }
        }

        let calls = walker.calls() - start_calls;
        let outcome = match &bracket {
            Some(view) => {
                let mut scanner = Scanner::new(target);
                scanner.scan(view);
                let position = scanner
                    .result
                    .insertion_position
                    .unwrap_or(view.start_position);
                SearchOutcome::not_found(Some(position), calls, Confidence::High)
                    .with_page(view.located())
            }
            None if newer_than_all => {
                SearchOutcome::not_found(Some(0), calls, Confidence::Medium)
            }
            None if lower > upper => {
                SearchOutcome::not_found(Some(lower), calls, Confidence::Medium)
            }
            None => {
                let confidence = if upper - lower <= self.window.radius.saturating_mul(2) {
                    Confidence::Medium
                } else {
                    Confidence::Low
                };
                SearchOutcome::not_found(Some(lower + (upper - lower) / 2), calls, confidence)
            }
        };

        Ok(BinaryReport {
            outcome,
            probes,
            bracket,
            lower,
            upper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitPolicy;
    use crate::navigation::fetcher::RateLimitedFetcher;
    use crate::observer::NoopObserver;
    use crate::source::InMemoryOrderSource;

    fn walker(source: &InMemoryOrderSource, page_size: usize) -> CursorWalker<'_> {
        CursorWalker::new(RateLimitedFetcher::new(
            source,
            "s",
            page_size,
            RateLimitPolicy::flat(1, 1),
            &NoopObserver,
        ))
    }

    fn navigator(iterations: usize) -> BinarySearchNavigator {
        BinarySearchNavigator::new(iterations, 100, WindowedSearch::new(40, 10))
    }

    #[tokio::test]
    async fn test_finds_every_position_exactly() {
        let source = InMemoryOrderSource::descending(5200, 250);
        for target in [5200, 5181, 5180, 5050, 4952, 4951] {
            let mut walker = walker(&source, 20);
            let report = navigator(15)
                .search(&mut walker, 0, 249, target)
                .await
                .unwrap();
            assert!(report.outcome.found, "target {} not found", target);
            assert_eq!(report.outcome.exact_position, source.position_of(target));
            assert_eq!(report.outcome.method, SearchMethod::Binary);
        }
    }

    #[tokio::test]
    async fn test_probe_count_respects_cap() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);

        let report = navigator(2).search(&mut walker, 0, 249, 4951).await.unwrap();
        assert!(!report.outcome.found);
        assert_eq!(report.probes, 2);
        assert_eq!(report.outcome.method, SearchMethod::NotFound);
    }

    #[tokio::test]
    async fn test_gap_inside_page_is_bracketed() {
        let source = InMemoryOrderSource::descending(5200, 250).without(&[5050]);
        let mut walker = walker(&source, 20);

        let report = navigator(15).search(&mut walker, 0, 248, 5050).await.unwrap();
        assert!(!report.outcome.found);
        assert_eq!(report.outcome.confidence, Confidence::High);
        assert!(report.bracket.is_some());
        // 5049 now sits where 5050 used to be.
        assert_eq!(report.outcome.exact_position, Some(150));
    }

    #[tokio::test]
    async fn test_target_newer_than_listing() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);

        let report = navigator(15).search(&mut walker, 0, 249, 9999).await.unwrap();
        assert!(!report.outcome.found);
        assert_eq!(report.outcome.exact_position, Some(0));
    }

    #[tokio::test]
    async fn test_bounds_past_end_are_clamped() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);

        let report = navigator(15).search(&mut walker, 0, 5_000, 4960).await.unwrap();
        assert!(report.outcome.found);
        assert_eq!(report.outcome.exact_position, Some(240));
    }
}
