use fsp_scraper::ParseError;
use fsp_store::StoreError;
use thiserror::Error;

/// A page could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("couldn't connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("forum refused {url}: {message}")]
    Forum { url: String, message: String },
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Forum { .. } | Self::Exhausted { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            Self::Timeout { url }
        } else if e.is_connect() {
            Self::Connect {
                url,
                reason: e.to_string(),
            }
        } else {
            Self::Transport {
                url,
                reason: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Network(#[from] FetchError),
    #[error("couldn't parse {url}: {source}")]
    Parse { url: String, source: ParseError },
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CrawlError {
    pub(crate) fn parse(url: &str, source: ParseError) -> Self {
        Self::Parse {
            url: url.to_string(),
            source,
        }
    }

    /// Errors that abort a whole run instead of a single section.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
