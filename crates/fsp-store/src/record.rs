use csv::StringRecord;
use fsp_scraper::{ThreadContent, ThreadSummary, Timestamp};
use serde::{Deserialize, Serialize};

/// Header row of the thread table, in column order.
pub const HEADERS: [&str; 11] = [
    "标题", "作者", "评论数", "浏览数", "点赞数", "收藏数", "字数", "板块", "发表时间", "更新时间", "链接",
];

pub(crate) const UPDATE_TIME_INDEX: usize = 9;
pub(crate) const URL_INDEX: usize = 10;

/// One row of the thread table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "标题")]
    pub title: String,
    #[serde(rename = "作者")]
    pub author: String,
    #[serde(rename = "评论数")]
    pub comment_count: u64,
    #[serde(rename = "浏览数")]
    pub view_count: u64,
    #[serde(rename = "点赞数")]
    pub recommend_count: u64,
    #[serde(rename = "收藏数")]
    pub favorite_count: u64,
    #[serde(rename = "字数")]
    pub word_count: u64,
    #[serde(rename = "板块")]
    pub section: String,
    #[serde(rename = "发表时间")]
    pub create_time: Timestamp,
    #[serde(rename = "更新时间")]
    pub update_time: Timestamp,
    #[serde(rename = "链接")]
    pub url: String,
}

impl PersistedRecord {
    pub fn new(section: &str, summary: &ThreadSummary, content: &ThreadContent) -> Self {
        Self {
            title: summary.title.clone(),
            author: summary.author.clone(),
            comment_count: summary.comment_count,
            view_count: summary.view_count,
            recommend_count: content.recommend_count,
            favorite_count: content.favorite_count,
            word_count: content.word_count,
            section: section.to_string(),
            create_time: summary.create_time,
            update_time: summary.update_time,
            url: summary.url.clone(),
        }
    }

    pub fn tid(&self) -> Option<String> {
        fsp_scraper::tid_from_url(&self.url)
    }

    pub(crate) fn to_string_record(&self) -> StringRecord {
        StringRecord::from(vec![
            self.title.clone(),
            self.author.clone(),
            self.comment_count.to_string(),
            self.view_count.to_string(),
            self.recommend_count.to_string(),
            self.favorite_count.to_string(),
            self.word_count.to_string(),
            self.section.clone(),
            self.create_time.to_string(),
            self.update_time.to_string(),
            self.url.clone(),
        ])
    }
}
