use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("couldn't read or write table: {0}")]
    Csv(#[from] csv::Error),
    #[error("couldn't read or write update index: {0}")]
    Json(#[from] serde_json::Error),
    #[error("couldn't replace {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
    #[error("unexpected header in {}: {found:?}", .path.display())]
    HeaderMismatch { path: PathBuf, found: Vec<String> },
    #[error("unsupported update index version {0}")]
    UnsupportedIndexVersion(u32),
}
