use crate::core::{OrderId, SamplePoint};

/// Records subtracted from the first sample when the target is newer than
/// anything sampled.
pub const NEWER_MARGIN: u64 = 5;

/// Upper search bound used when nothing could be sampled.
pub const UNSAMPLED_SEARCH_SPAN: u64 = 1_000;

/// Expected position of `target` given sampled ID ranges.
///
/// `samples` must be ordered by position, as produced by the sampler.
pub fn estimate_position(samples: &[SamplePoint], target: OrderId) -> u64 {
    let Some(first) = samples.first() else {
        return 1;
    };

    if target > first.max_id {
        return first.position.saturating_sub(NEWER_MARGIN);
    }

    if let Some(sample) = samples.iter().find(|s| s.min_id <= target && target <= s.max_id) {
        return within_page(sample, target);
    }

    for pair in samples.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        if target <= newer.min_id && target >= older.max_id {
            return interpolate(newer, older, target);
        }
    }

    extrapolate(samples, target)
}

/// Position range the binary navigator should start from.
pub fn search_bounds(samples: &[SamplePoint], target: OrderId, page_size: usize) -> (u64, u64) {
    let page_size = page_size.max(1) as u64;
    let Some(first) = samples.first() else {
        return (0, UNSAMPLED_SEARCH_SPAN);
    };

    if target > first.max_id {
        return (0, first.position + page_size);
    }

    if let Some(sample) = samples.iter().find(|s| s.min_id <= target && target <= s.max_id) {
        return (sample.position, last_position(sample));
    }

    for pair in samples.windows(2) {
        let (newer, older) = (&pair[0], &pair[1]);
        if target <= newer.min_id && target >= older.max_id {
            return (newer.position, last_position(older));
        }
    }

    let last = &samples[samples.len() - 1];
    let estimate = extrapolate(samples, target);
    let spread = estimate.saturating_sub(last.position).max(page_size);
    (last.position, estimate.saturating_add(spread))
}

fn last_position(sample: &SamplePoint) -> u64 {
    sample.position + (sample.record_count.max(1) as u64 - 1)
}

fn within_page(sample: &SamplePoint, target: OrderId) -> u64 {
    let span = sample.max_id - sample.min_id;
    if span == 0 || sample.record_count <= 1 {
        return sample.position;
    }
    let scaled = (sample.max_id - target) as f64 * (sample.record_count - 1) as f64;
    sample.position + (scaled / span as f64).floor() as u64
}

fn interpolate(newer: &SamplePoint, older: &SamplePoint, target: OrderId) -> u64 {
    let id_span = newer.min_id.saturating_sub(older.max_id);
    let position_span = older.position.saturating_sub(newer.position);
    if id_span == 0 {
        return newer.position;
    }
    let scaled = (newer.min_id - target) as f64 * position_span as f64;
    newer.position + (scaled / id_span as f64).floor() as u64
}

fn extrapolate(samples: &[SamplePoint], target: OrderId) -> u64 {
    let last = &samples[samples.len() - 1];
    let density = match samples.len() {
        0 | 1 => 1.0,
        n => {
            let previous = &samples[n - 2];
            let id_delta = previous.max_id.saturating_sub(last.max_id) as f64;
            let position_delta = last.position.saturating_sub(previous.position) as f64;
            if id_delta > 0.0 && position_delta > 0.0 {
                id_delta / position_delta
            } else {
                1.0
            }
        }
    };
    let distance = last.max_id.saturating_sub(target) as f64 / density;
    last.position.saturating_add(distance.floor() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(position: u64, max_id: u64, count: usize) -> SamplePoint {
        SamplePoint {
            position,
            min_id: max_id - (count as u64 - 1),
            max_id,
            cursor: None,
            record_count: count,
        }
    }

    fn dense_samples() -> Vec<SamplePoint> {
        // IDs 5200 down to 4951, one id per position, pages of 20.
        vec![point(0, 5200, 20), point(100, 5100, 20), point(200, 5000, 20)]
    }

    #[test]
    fn test_no_samples_falls_back_to_one() {
        assert_eq!(estimate_position(&[], 42), 1);
        assert_eq!(search_bounds(&[], 42, 20), (0, UNSAMPLED_SEARCH_SPAN));
    }

    #[test]
    fn test_interpolates_between_samples() {
        let samples = dense_samples();
        // 5050 sits between the page ending at 5081 and the page starting at 5000.
        let estimate = estimate_position(&samples, 5050);
        assert_eq!(estimate, 138);
        assert_eq!(search_bounds(&samples, 5050, 20), (100, 219));
    }

    #[test]
    fn test_inside_sampled_page_is_exact_for_dense_ids() {
        let samples = dense_samples();
        assert_eq!(estimate_position(&samples, 5095), 105);
        assert_eq!(search_bounds(&samples, 5095, 20), (100, 119));
    }

    #[test]
    fn test_newer_than_first_sample_clamps_to_zero() {
        let samples = dense_samples();
        assert_eq!(estimate_position(&samples, 9999), 0);

        let shifted = vec![point(40, 5160, 20)];
        assert_eq!(estimate_position(&shifted, 9999), 40 - NEWER_MARGIN);
    }

    #[test]
    fn test_extrapolates_with_last_two_samples() {
        // Two ids per position.
        let samples = vec![point(0, 10_000, 20), point(100, 9_800, 20)];
        assert_eq!(estimate_position(&samples, 9_600), 200);
        let (lower, upper) = search_bounds(&samples, 9_600, 20);
        assert_eq!(lower, 100);
        assert_eq!(upper, 300);
    }

    #[test]
    fn test_sparse_tail_saturates_instead_of_overflowing() {
        // One id apart over a thousand positions: near-zero density.
        let newest = u64::MAX / 2;
        let samples = vec![point(0, newest, 1), point(1_000, newest - 1, 1)];

        assert_eq!(estimate_position(&samples, 1), u64::MAX);
        assert_eq!(search_bounds(&samples, 1, 20), (1_000, u64::MAX));
    }

    #[test]
    fn test_single_sample_extrapolates_one_id_per_position() {
        let samples = vec![point(0, 100, 20)];
        assert_eq!(estimate_position(&samples, 50), 50);
    }
}
