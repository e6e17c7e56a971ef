use super::walker::{CursorWalker, WalkOutcome};
use crate::core::{RecoveryError, SamplePoint};

/// Points collected by one sampling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleRun {
    pub points: Vec<SamplePoint>,
    pub calls: u64,
    /// Error that cut the pass short. Points gathered before it are kept.
    pub interrupted: Option<RecoveryError>,
}

/// Samples the ID range found at a list of checkpoint positions.
#[derive(Debug, Clone, Default)]
pub struct DistributionSampler {
    checkpoints: Vec<u64>,
    max_calls: u64,
}

impl DistributionSampler {
    pub fn new(checkpoints: &[u64], max_calls: u64) -> Self {
        let mut checkpoints = checkpoints.to_vec();
        checkpoints.sort_unstable();
        checkpoints.dedup();
        Self {
            checkpoints,
            max_calls,
        }
    }

    pub fn checkpoints(&self) -> &[u64] {
        &self.checkpoints
    }

    /// Visits each checkpoint in ascending order, reusing walk progress.
    ///
    /// A checkpoint that lands on an already sampled page is skipped. When
    /// the listing ends first, its last page is sampled and the pass stops.
    pub async fn sample(&self, walker: &mut CursorWalker<'_>) -> SampleRun {
        let start_calls = walker.calls();
        let mut run = SampleRun::default();

        for &checkpoint in &self.checkpoints {
            let used = walker.calls() - start_calls;
            let budget = self.max_calls.saturating_sub(used);

            let walk = match walker.advance_to(checkpoint, budget).await {
                Ok(walk) => walk,
                Err(err) => {
                    run.interrupted = Some(err);
                    break;
                }
            };

            match walk.outcome {
                WalkOutcome::Reached(view) => push_point(&mut run.points, view.to_sample()),
                WalkOutcome::EndOfSequence { last, .. } => {
                    push_point(&mut run.points, last.and_then(|v| v.to_sample()));
                    break;
                }
                WalkOutcome::BudgetExhausted { .. } => break,
            }
        }

        run.calls = walker.calls() - start_calls;
        run
    }
}

fn push_point(points: &mut Vec<SamplePoint>, point: Option<SamplePoint>) {
    let Some(point) = point else {
        return;
    };
    if points.last().is_some_and(|last| last.position == point.position) {
        return;
    }
    points.push(point);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitPolicy;
    use crate::navigation::fetcher::RateLimitedFetcher;
    use crate::observer::NoopObserver;
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
    async fn test_samples_are_monotone() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);
        let sampler = DistributionSampler::new(&[100, 0, 40, 200], 100);

        let run = sampler.sample(&mut walker).await;
        assert!(run.interrupted.is_none());
        let positions: Vec<u64> = run.points.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 40, 100, 200]);
        for pair in run.points.windows(2) {
            assert!(pair[0].min_id >= pair[1].max_id);
        }
        assert_eq!(run.points[0].cursor, None);
        assert_eq!(run.points[0].max_id, 5200);
        assert_eq!(run.calls, 11);
    }

    #[tokio::test]
    async fn test_duplicate_page_is_sampled_once() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);
        let sampler = DistributionSampler::new(&[0, 5, 19], 100);

        let run = sampler.sample(&mut walker).await;
        assert_eq!(run.points.len(), 1);
        assert_eq!(run.calls, 1);
    }

    #[tokio::test]
    async fn test_end_of_sequence_samples_last_page() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);
        let sampler = DistributionSampler::new(&[0, 1000, 2000], 100);

        let run = sampler.sample(&mut walker).await;
        let last = run.points.last().unwrap();
        assert_eq!(last.position, 240);
        assert_eq!(last.min_id, 4951);
        assert_eq!(last.record_count, 10);
        assert_eq!(run.points.len(), 2);
    }

    #[tokio::test]
    async fn test_error_keeps_partial_points() {
        let source = InMemoryOrderSource::descending(5200, 250);
        let mut walker = walker(&source, 20);
        walker.advance_to(0, 1).await.unwrap();
        source.push_failure(ScriptedFailure::Transport).await;
        let sampler = DistributionSampler::new(&[0, 100], 100);

        let run = sampler.sample(&mut walker).await;
        assert_eq!(run.points.len(), 1);
        assert!(matches!(run.interrupted, Some(RecoveryError::Transport(_))));
    }
}
