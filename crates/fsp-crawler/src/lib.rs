mod artifact;
mod config;
mod content;
mod crawler;
mod error;
mod fetch;

pub use artifact::ArtifactWriter;
pub use config::{CrawlerConfig, RetryConfig};
pub use content::ContentFetcher;
pub use crawler::{page_url, CrawlSummary, Crawler, SectionReport};
pub use error::{CrawlError, FetchError};
pub use fetch::{with_retry, HttpFetcher, PageSource, RetryPolicy};
