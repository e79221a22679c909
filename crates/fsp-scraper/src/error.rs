use std::fmt;

use thiserror::Error;

/// A structural assumption about a page does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing page count marker (共 N 页)")]
    MissingPageCount,
    #[error("no thread links on listing page, cookies may have expired")]
    NoThreadLinks,
    #[error("missing element `{0}`")]
    MissingElement(&'static str),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Listing page column a row value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Counts,
    Author,
    CreateTime,
    Subject,
    UpdateTime,
    Uid,
}

impl Column {
    /// Whether a failure in this column excludes the row from the page result.
    ///
    /// Counts and timestamps have sentinels (`0`, epoch); identity columns don't.
    pub fn drops_row(self) -> bool {
        matches!(self, Self::Author | Self::Subject | Self::Uid)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counts => "counts",
            Self::Author => "author",
            Self::CreateTime => "create time",
            Self::Subject => "subject",
            Self::UpdateTime => "update time",
            Self::Uid => "uid",
        };
        f.write_str(name)
    }
}

/// A single listing cell that could not be read; recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row} {column}: {reason}")]
pub struct PartialFieldError {
    pub row: usize,
    pub column: Column,
    pub reason: String,
}

impl PartialFieldError {
    pub(crate) fn new(row: usize, column: Column, reason: impl Into<String>) -> Self {
        Self {
            row,
            column,
            reason: reason.into(),
        }
    }
}
