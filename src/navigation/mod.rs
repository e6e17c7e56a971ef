//! Search strategies over the forward-only order listing.
//!
//! Leaf first: [`RateLimitedFetcher`] issues single page reads,
//! [`CursorWalker`] turns them into positioned walks, and the strategies on
//! top ([`DistributionSampler`], [`BinarySearchNavigator`],
//! [`WindowedSearch`], [`CursorSweep`], [`ExhaustiveSweep`]) share one walker
//! so every fetch is counted once per run.

pub mod binary;
pub mod estimator;
pub mod fetcher;
pub mod sampler;
pub mod scan;
pub mod sweep;
pub mod walker;
pub mod window;

pub use binary::{BinaryReport, BinarySearchNavigator};
pub use estimator::{estimate_position, search_bounds};
pub use fetcher::RateLimitedFetcher;
pub use sampler::{DistributionSampler, SampleRun};
pub use scan::ScanResult;
pub use sweep::{CursorSweep, ExhaustiveSweep};
pub use walker::{CursorWalker, PageView, WalkOutcome, WalkResult};
pub use window::WindowedSearch;
