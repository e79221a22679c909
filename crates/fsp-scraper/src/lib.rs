mod error;
pub mod listing;
pub mod model;
mod page;
pub mod thread;

pub use error::{Column, ParseError, PartialFieldError};
pub use listing::{page_count, parse_listing, ListingPage};
pub use model::{canonical_url, ThreadContent, ThreadSummary, Timestamp, UNKNOWN_AUTHOR};
pub use page::{clean_title, forum_message, tid_from_url};
pub use thread::{parse_thread_page, ThreadHead, ThreadPage};
