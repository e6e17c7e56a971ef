use super::scan::{ScanResult, Scanner};
use super::walker::{CursorWalker, WalkOutcome};
use crate::core::{OrderId, Result};

/// Bounded linear scan starting a little before an estimated position.
///
/// Starts from the closest known cursor at or before `estimate - margin`
/// and stops once a page older than the target shows it was passed. A
/// start that already overshot the target stops on its first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSweep {
    pub margin: u64,
    pub max_calls: u64,
}

impl CursorSweep {
    pub fn new(margin: u64, max_calls: u64) -> Self {
        Self { margin, max_calls }
    }

    pub async fn sweep(
        &self,
        walker: &mut CursorWalker<'_>,
        estimate: u64,
        target: OrderId,
    ) -> Result<ScanResult> {
        let start_calls = walker.calls();
        let from = estimate.saturating_sub(self.margin);
        let mut scanner = Scanner::new(target);

        let walk = walker.advance_to(from, self.max_calls).await?;
        let mut view = match walk.outcome {
            WalkOutcome::Reached(view) => view,
            WalkOutcome::EndOfSequence {
                last: Some(view), ..
            } => view,
            WalkOutcome::EndOfSequence { last: None, .. } => {
                scanner.result.end_of_sequence = true;
                return Ok(scanner.finish(walker.calls() - start_calls));
            }
            WalkOutcome::BudgetExhausted { .. } => {
                return Ok(scanner.finish(walker.calls() - start_calls));
            }
        };

        loop {
            if scanner.scan(&view) || scanner.passed_target() {
                break;
            }
            if view.page.max_id().is_some_and(|max| max < target) {
                break;
            }
            if walker.at_end() {
                scanner.result.end_of_sequence = true;
                break;
            }
            if walker.calls() - start_calls >= self.max_calls {
                break;
            }
            match walker.next_page().await? {
                Some(next) => view = next,
                None => {
                    scanner.result.end_of_sequence = true;
                    break;
                }
            }
        }

        Ok(scanner.finish(walker.calls() - start_calls))
    }
}

/// Last-resort walk over the whole listing from position 0.
///
/// The only strategy that can prove an id is absent: reaching the end of
/// the listing within budget without a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExhaustiveSweep {
    pub max_calls: u64,
}

impl ExhaustiveSweep {
    pub fn new(max_calls: u64) -> Self {
        Self { max_calls }
    }

    pub async fn sweep(&self, walker: &mut CursorWalker<'_>, target: OrderId) -> Result<ScanResult> {
        let start_calls = walker.calls();
        let mut scanner = Scanner::from_start(target);
        walker.restart();

        loop {
            if walker.at_end() {
                scanner.result.end_of_sequence = true;
                break;
            }
            if walker.calls() - start_calls >= self.max_calls {
                break;
            }
            match walker.next_page().await? {
                Some(view) => {
                    if scanner.scan(&view) {
                        break;
                    }
                }
                None => {
                    scanner.result.end_of_sequence = true;
                    break;
                }
            }
        }

        Ok(scanner.finish(walker.calls() - start_calls))
    }
}
