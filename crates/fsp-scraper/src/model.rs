use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Author shown when a listing row carries no author link.
pub const UNKNOWN_AUTHOR: &str = "未知作者";

/// A forum timestamp, compared as a parsed date time and never as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// The sentinel used when a timestamp cannot be read from a page.
    pub fn epoch() -> Self {
        let epoch = NaiveDate::from_ymd_opt(1990, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("1990-01-01 00:00 is a valid date time");
        Self(epoch)
    }

    /// Parses the formats the forum renders: `2024-1-5 9:05`, `2024-1-5 9:05:30` and `2024-1-5`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(Self)
    }

    pub fn parse_or_epoch(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(Self::epoch)
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::epoch()
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Seconds are kept when present so that a re-read value compares equal.
        if self.0.second() == 0 {
            write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
        } else {
            write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse_or_epoch(&text))
    }
}

/// One thread row read from a section listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub tid: String,
    pub title: String,
    pub author: String,
    pub comment_count: u64,
    pub view_count: u64,
    pub update_time: Timestamp,
    pub create_time: Timestamp,
    pub uid: String,
    /// Canonical first page URL, see [`canonical_url`].
    pub url: String,
}

/// What was gathered by walking every page of a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadContent {
    pub recommend_count: u64,
    pub favorite_count: u64,
    pub word_count: u64,
    pub title: String,
    pub body_artifact: Option<PathBuf>,
    /// False when fetching failed part way and the counts were zeroed.
    pub complete: bool,
}

impl ThreadContent {
    pub fn failed() -> Self {
        Self::default()
    }
}

pub fn canonical_url(host: &str, tid: &str, uid: &str) -> String {
    format!("https://{host}/forum.php?mod=viewthread&tid={tid}&page=1&authorid={uid}")
}
