use super::walker::PageView;
use crate::core::{Confidence, OrderId, SearchMethod, SearchOutcome};

/// Outcome of a linear scan over consecutive pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Absolute position and page of the exact match.
    pub hit: Option<(u64, PageView)>,
    pub calls: u64,
    pub pages_scanned: u64,
    /// The listing ended inside the scan.
    pub end_of_sequence: bool,
    /// First position holding an id older than the target, after an id
    /// newer than it was seen. Where the target would sit if it existed.
    pub insertion_position: Option<u64>,
    /// Page holding `insertion_position`.
    pub insertion_page: Option<PageView>,
}

impl ScanResult {
    pub fn found(&self) -> bool {
        self.hit.is_some()
    }

    /// Converts a hit into a found outcome for `method`.
    pub fn into_found(self, method: SearchMethod, total_calls: u64) -> Option<SearchOutcome> {
        let (position, view) = self.hit?;
        let page = view.located()?;
        Some(SearchOutcome::found(position, total_calls, method, page))
    }

    /// A miss that still tells where the target would be.
    pub fn insertion_outcome(&self, total_calls: u64, confidence: Confidence) -> Option<SearchOutcome> {
        let position = self.insertion_position?;
        let page = self.insertion_page.as_ref().and_then(|v| v.located());
        Some(SearchOutcome::not_found(Some(position), total_calls, confidence).with_page(page))
    }
}

/// Running state of a scan looking for one id.
#[derive(Debug, Clone)]
pub(crate) struct Scanner {
    target: OrderId,
    seen_newer: bool,
    pub(crate) result: ScanResult,
}

impl Scanner {
    /// Scan starting mid-listing: only ids seen count as newer.
    pub(crate) fn new(target: OrderId) -> Self {
        Self {
            target,
            seen_newer: false,
            result: ScanResult::default(),
        }
    }

    /// Scan starting at position 0, where everything before is "newer".
    pub(crate) fn from_start(target: OrderId) -> Self {
        Self {
            seen_newer: true,
            ..Self::new(target)
        }
    }

    /// Inspects one page. Returns `true` on an exact match.
    pub(crate) fn scan(&mut self, view: &PageView) -> bool {
        self.result.pages_scanned += 1;
        for (idx, record) in view.page.records.iter().enumerate() {
            let position = view.start_position + idx as u64;
            if record.id == self.target {
                self.result.hit = Some((position, view.clone()));
                return true;
            }
            if record.id > self.target {
                self.seen_newer = true;
            } else if self.seen_newer && self.result.insertion_position.is_none() {
                self.result.insertion_position = Some(position);
                self.result.insertion_page = Some(view.clone());
            }
        }
        false
    }

    /// The target would have appeared before the current point.
    pub(crate) fn passed_target(&self) -> bool {
        self.result.insertion_position.is_some()
    }

    pub(crate) fn finish(mut self, calls: u64) -> ScanResult {
        self.result.calls = calls;
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OrderPage, RemoteOrderRecord};

    fn view(start: u64, ids: &[u64]) -> PageView {
        PageView {
            start_position: start,
            cursor: None,
            page: OrderPage::new(ids.iter().map(|&id| RemoteOrderRecord::new(id)).collect(), None),
        }
    }

    #[test]
    fn test_scan_finds_exact_position() {
        let mut scanner = Scanner::new(47);
        assert!(!scanner.scan(&view(0, &[50, 49, 48])));
        assert!(scanner.scan(&view(3, &[47, 46, 45])));
        let result = scanner.finish(2);
        assert_eq!(result.hit.as_ref().map(|(p, _)| *p), Some(3));
        assert_eq!(result.pages_scanned, 2);
    }

    #[test]
    fn test_scan_records_insertion_point_for_gap() {
        let mut scanner = Scanner::new(48);
        assert!(!scanner.scan(&view(10, &[50, 49, 47, 46])));
        assert!(scanner.passed_target());
        assert_eq!(scanner.result.insertion_position, Some(12));
    }

    #[test]
    fn test_mid_listing_scan_needs_a_newer_id_first() {
        let mut scanner = Scanner::new(60);
        scanner.scan(&view(10, &[50, 49]));
        assert!(!scanner.passed_target());

        let mut from_start = Scanner::from_start(60);
        from_start.scan(&view(0, &[50, 49]));
        assert_eq!(from_start.result.insertion_position, Some(0));
    }
}
