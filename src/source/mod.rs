//! Access to the remote, newest-first order listing.
//!
//! The listing can only be read forward: each page carries an opaque cursor
//! for the next one and there is no offset or lookup by id. Everything in
//! [`crate::navigation`] is built on the single [`OrderPageSource::fetch_page`]
//! call defined here.

mod http;
mod memory;

pub use http::{HttpOrderSource, HttpSourceFactory};
pub use memory::{InMemoryOrderSource, MemorySourceFactory, ScriptedFailure};

use crate::config::RecoveryConfig;
use crate::core::{OrderPage, Result, StoreConfig};
use async_trait::async_trait;

/// A single paginated read against the order API.
///
/// Implementations report HTTP 429 as [`crate::RecoveryError::RateLimited`]
/// and leave retrying to the caller. A missing or unreadable body is an empty
/// page, which callers treat as the end of the sequence.
#[async_trait]
pub trait OrderPageSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<&str>, per_page: usize) -> Result<OrderPage>;
}

#[async_trait]
impl<S: OrderPageSource + ?Sized> OrderPageSource for std::sync::Arc<S> {
    async fn fetch_page(&self, cursor: Option<&str>, per_page: usize) -> Result<OrderPage> {
        (**self).fetch_page(cursor, per_page).await
    }
}

/// Builds the page source for a configured store.
pub trait SourceFactory: Send + Sync {
    fn open(&self, store: &StoreConfig, config: &RecoveryConfig)
    -> Result<Box<dyn OrderPageSource>>;
}
