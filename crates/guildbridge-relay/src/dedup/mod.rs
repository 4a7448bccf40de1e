//! Message deduplication over a bounded recency window.

mod window;

pub use window::{MessageDeduplicator, clean_message};
