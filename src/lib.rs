// ============================================================================
// ordercursor Library
// ============================================================================

//! Recovers the resume position of an incremental order sync against an API
//! that only offers forward cursor pagination, newest first.
//!
//! Given the newest order id already stored locally, a
//! [`RecoveryOrchestrator`] finds the position (and the cursor of the page)
//! holding that order with as few page fetches as possible, then writes a
//! [`Bookmark`] the sync can resume from.
//!
//! ```no_run
//! use ordercursor::{
//!     InMemoryBookmarkStore, InMemoryOrderSource, MemorySourceFactory, RecoveryConfig,
//!     RecoveryOrchestrator, StaticOrderIndex,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> ordercursor::Result<()> {
//! let source = InMemoryOrderSource::descending(5200, 250);
//! let orchestrator = RecoveryOrchestrator::new(
//!     RecoveryConfig::default(),
//!     Arc::new(InMemoryBookmarkStore::new()),
//!     Arc::new(StaticOrderIndex::new()),
//!     Arc::new(MemorySourceFactory::new()),
//! );
//! let recovery = orchestrator.recover("demo", &source, 5050).await?;
//! assert_eq!(recovery.outcome.exact_position, Some(150));
//! # Ok(())
//! # }
//! ```

pub mod bookmark;
pub mod config;
pub mod core;
pub mod local;
pub mod navigation;
pub mod observer;
pub mod recovery;
pub mod source;

mod fs_utils;

// Re-export main types for convenience
pub use bookmark::{BookmarkStore, FileBookmarkStore, InMemoryBookmarkStore, bookmark_key};
pub use config::{BatchFile, RateLimitPolicy, RecoveryConfig, load_batch_file};
pub use core::{
    Bookmark, Clock, Confidence, FixedClock, LocatedPage, OrderId, OrderPage, RecoveryError,
    RemoteOrderRecord, Result, SamplePoint, SearchMethod, SearchOutcome, StoreConfig,
    SystemClock,
};
pub use local::{LocalOrderIndex, StaticOrderIndex, load_local_index};
pub use observer::{
    CollectingObserver, NoopObserver, ObserverEvent, RecoveryObserver, RecoveryPhase,
    TracingObserver,
};
pub use recovery::{BatchReport, RecoveryOrchestrator, ReportRow, StoreRecovery};
pub use source::{
    HttpOrderSource, HttpSourceFactory, InMemoryOrderSource, MemorySourceFactory,
    OrderPageSource, ScriptedFailure, SourceFactory,
};
