use std::cmp;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Static headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// JSON object of extra headers (cookie, authorization), read once.
    #[serde(default)]
    pub headers_file: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_page_workers")]
    pub page_workers: usize,

    #[serde(default = "default_thread_workers")]
    pub thread_workers: usize,

    #[serde(default = "default_section_workers")]
    pub section_workers: usize,

    #[serde(default = "default_max_thread_pages")]
    pub max_thread_pages: usize,

    #[serde(default = "default_table_file")]
    pub table_file: PathBuf,

    /// Defaults to `<table file>.index.json`.
    #[serde(default)]
    pub index_file: Option<PathBuf>,

    /// Where thread texts are written, `<dir>/<section>/<title>.txt`.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    /// Section name to the URL of its first listing page.
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            headers_file: None,
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            page_workers: default_page_workers(),
            thread_workers: default_thread_workers(),
            section_workers: default_section_workers(),
            max_thread_pages: default_max_thread_pages(),
            table_file: default_table_file(),
            index_file: None,
            artifact_dir: None,
            sections: BTreeMap::new(),
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn index_path(&self) -> PathBuf {
        match &self.index_file {
            Some(path) => path.clone(),
            None => {
                let mut name = self.table_file.clone().into_os_string();
                name.push(".index.json");
                PathBuf::from(name)
            }
        }
    }
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    )
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_workers() -> usize {
    15
}

fn default_thread_workers() -> usize {
    10
}

fn default_section_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_max_thread_pages() -> usize {
    500
}

fn default_table_file() -> PathBuf {
    PathBuf::from("data.csv")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_wait_multiplier_ms")]
    pub wait_multiplier_ms: u64,

    #[serde(default = "default_wait_max_ms")]
    pub wait_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            wait_multiplier_ms: default_wait_multiplier_ms(),
            wait_max_ms: default_wait_max_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_wait_multiplier_ms() -> u64 {
    1_000
}

fn default_wait_max_ms() -> u64 {
    10_000
}
