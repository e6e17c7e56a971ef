//! Caller-supplied observability hooks.
//!
//! The recovery engine never logs on its own. It reports what happens to a
//! [`RecoveryObserver`]; [`TracingObserver`] forwards those reports to
//! `tracing`, [`CollectingObserver`] keeps them in memory.

use crate::core::{Bookmark, RecoveryError};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{Level, event};

/// Stages of a per-store recovery run, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryPhase {
    BookmarkCheck,
    Sampling,
    BinarySearch,
    CursorSweep,
    ExhaustiveSearch,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryPhase::BookmarkCheck => "BOOKMARK_CHECK",
            RecoveryPhase::Sampling => "SAMPLING",
            RecoveryPhase::BinarySearch => "BINARY_SEARCH",
            RecoveryPhase::CursorSweep => "CURSOR_SWEEP",
            RecoveryPhase::ExhaustiveSearch => "EXHAUSTIVE_SEARCH",
        };
        write!(f, "{}", name)
    }
}

/// Receives progress reports. Every method defaults to a no-op.
pub trait RecoveryObserver: Send + Sync {
    fn phase_started(&self, _store: &str, _phase: RecoveryPhase) {}

    fn phase_finished(&self, _store: &str, _phase: RecoveryPhase, _found: bool, _calls: u64) {}

    fn phase_failed(&self, _store: &str, _phase: RecoveryPhase, _error: &RecoveryError) {}

    fn page_fetched(&self, _store: &str, _cursor: Option<&str>, _records: usize) {}

    fn rate_limited(&self, _store: &str, _attempt: usize, _delay: Duration) {}

    fn bookmark_written(&self, _bookmark: &Bookmark) {}

    fn store_failed(&self, _store: &str, _error: &RecoveryError) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RecoveryObserver for NoopObserver {}

/// Emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RecoveryObserver for TracingObserver {
    fn phase_started(&self, store: &str, phase: RecoveryPhase) {
        event!(Level::INFO, store, phase = %phase, "phase started");
    }

    fn phase_finished(&self, store: &str, phase: RecoveryPhase, found: bool, calls: u64) {
        event!(Level::INFO, store, phase = %phase, found, calls, "phase finished");
    }

    fn phase_failed(&self, store: &str, phase: RecoveryPhase, error: &RecoveryError) {
        event!(
            Level::WARN,
            store,
            phase = %phase,
            transient = error.is_transient(),
            error = %error,
            "phase failed, escalating"
        );
    }

    fn page_fetched(&self, store: &str, cursor: Option<&str>, records: usize) {
        event!(Level::TRACE, store, cursor = cursor.unwrap_or("-"), records, "page fetched");
    }

    fn rate_limited(&self, store: &str, attempt: usize, delay: Duration) {
        event!(
            Level::WARN,
            store,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "rate limited, backing off"
        );
    }

    fn bookmark_written(&self, bookmark: &Bookmark) {
        event!(
            Level::INFO,
            store = %bookmark.store_identifier,
            page = bookmark.last_page,
            position = bookmark.position,
            confidence = %bookmark.confidence,
            "bookmark written"
        );
    }

    fn store_failed(&self, store: &str, error: &RecoveryError) {
        event!(Level::ERROR, store, error = %error, "store recovery failed");
    }
}

/// One recorded observer call.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    PhaseStarted(String, RecoveryPhase),
    PhaseFinished {
        store: String,
        phase: RecoveryPhase,
        found: bool,
        calls: u64,
    },
    PhaseFailed(String, RecoveryPhase, RecoveryError),
    PageFetched(String, usize),
    RateLimited {
        store: String,
        attempt: usize,
        delay: Duration,
    },
    BookmarkWritten(Bookmark),
    StoreFailed(String, RecoveryError),
}

/// Keeps every observer call for later inspection.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Phases in the order they started, for one store.
    pub fn phases(&self, store: &str) -> Vec<RecoveryPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObserverEvent::PhaseStarted(s, phase) if s == store => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObserverEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RecoveryObserver for CollectingObserver {
    fn phase_started(&self, store: &str, phase: RecoveryPhase) {
        self.push(ObserverEvent::PhaseStarted(store.to_string(), phase));
    }

    fn phase_finished(&self, store: &str, phase: RecoveryPhase, found: bool, calls: u64) {
        self.push(ObserverEvent::PhaseFinished {
            store: store.to_string(),
            phase,
            found,
            calls,
        });
    }

    fn phase_failed(&self, store: &str, phase: RecoveryPhase, error: &RecoveryError) {
        self.push(ObserverEvent::PhaseFailed(
            store.to_string(),
            phase,
            error.clone(),
        ));
    }

    fn page_fetched(&self, store: &str, _cursor: Option<&str>, records: usize) {
        self.push(ObserverEvent::PageFetched(store.to_string(), records));
    }

    fn rate_limited(&self, store: &str, attempt: usize, delay: Duration) {
        self.push(ObserverEvent::RateLimited {
            store: store.to_string(),
            attempt,
            delay,
        });
    }

    fn bookmark_written(&self, bookmark: &Bookmark) {
        self.push(ObserverEvent::BookmarkWritten(bookmark.clone()));
    }

    fn store_failed(&self, store: &str, error: &RecoveryError) {
        self.push(ObserverEvent::StoreFailed(store.to_string(), error.clone()));
    }
}
