pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{RecoveryError, Result};
pub use types::{
    Bookmark, Confidence, LocatedPage, OrderId, OrderPage, RemoteOrderRecord, SamplePoint,
    SearchMethod, SearchOutcome, StoreConfig, page_number,
};
