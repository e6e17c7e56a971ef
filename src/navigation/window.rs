use super::scan::{ScanResult, Scanner};
use super::walker::{CursorWalker, WalkOutcome};
use crate::core::{OrderId, Result};

/// Scans every record within `radius` positions of a center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedSearch {
    pub radius: u64,
    pub max_calls: u64,
}

impl WindowedSearch {
    pub fn new(radius: u64, max_calls: u64) -> Self {
        Self { radius, max_calls }
    }

    /// Walks to `center - radius` and scans forward past `center + radius`,
    /// issuing at most `max_calls` fetches.
    pub async fn search_around(
        &self,
        walker: &mut CursorWalker<'_>,
        center: u64,
        target: OrderId,
    ) -> Result<ScanResult> {
        let start_calls = walker.calls();
        let from = center.saturating_sub(self.radius);
        let to = center.saturating_add(self.radius);
        let mut scanner = Scanner::new(target);

        let walk = walker.advance_to(from, self.max_calls).await?;
        let mut view = match walk.outcome {
            WalkOutcome::Reached(view) => view,
            WalkOutcome::EndOfSequence { .. } => {
                scanner.result.end_of_sequence = true;
                return Ok(scanner.finish(walker.calls() - start_calls));
            }
            WalkOutcome::BudgetExhausted { .. } => {
                return Ok(scanner.finish(walker.calls() - start_calls));
            }
        };

        loop {
            if scanner.scan(&view) || view.end_position() > to {
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
