use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use fsp_crawler::{CrawlError, Crawler, CrawlerConfig, FetchError, PageSource};
use fsp_scraper::{canonical_url, Timestamp};
use fsp_store::MergeStore;

const HOST: &str = "bbs.example.org";
const SECTION_URL: &str = "https://bbs.example.org/forum-85-1.html";

/// In-memory forum: every known URL answers its markup, anything else is a 404.
#[derive(Default)]
struct FakeForum {
    pages: HashMap<String, String>,
    fetches: Mutex<Vec<String>>,
}

impl FakeForum {
    fn page(mut self, url: &str, markup: String) -> Self {
        self.pages.insert(url.to_string(), markup);
        self
    }

    fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

impl PageSource for FakeForum {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn updated(tid: u32) -> String {
    format!("2023-5-{} 10:00", tid % 28 + 1)
}

/// Every thread is written by the same member so that URLs don't depend on
/// how uids line up with rows.
const UID: &str = "42";

fn row(tid: u32, updated: &str) -> String {
    format!(
        r#"<tbody id="normalthread_{tid}"><tr>
<th><a href="thread-{tid}-1-1.html" class="s xst">故事{tid}<span title="{updated}">[最后更新: {updated}]</span></a></th>
<td class="by"><div class="acgifby1"><a href="space-uid-{UID}.html" cs="1">作者{tid}</a><span title="2023-4-1 09:00">2023-4-1</span></div></td>
<td class="num"><div class="acgifnums"><a href="thread-{tid}-1-1.html" class="xi2">{tid}</a><span>1{tid}</span></div></td>
</tr></tbody>"#
    )
}

fn listing(total: u32, rows: &[String]) -> String {
    format!(
        r#"<html><body><div id="pgt"><span title="共 {total} 页"> / {total} 页</span></div><table>{}</table></body></html>"#,
        rows.join("\n")
    )
}

fn thread_url(tid: u32) -> String {
    canonical_url(HOST, &tid.to_string(), UID)
}

fn thread_page(tid: u32, body: &str, next: Option<&str>) -> String {
    let next = next
        .map(|href| format!(r#"<div class="pg"><a class="nxt" href="{href}">下一页</a></div>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
<h1><span id="thread_subject">故事{tid}</span></h1>
<span id="recommendv_add">3</span><span id="favoritenumber">4</span>
<div class="t_f">{body}</div>
{next}
</body></html>"#
    )
}

/// First listing page: 20 rows, the 7th lacks its uid link so the last row
/// is left without one and dropped.
fn first_page(bumped: Option<(u32, &str)>) -> String {
    let rows = (1..=20)
        .map(|tid| {
            let row = match bumped {
                Some((bumped, time)) if bumped == tid => row(tid, time),
                _ => row(tid, &updated(tid)),
            };
            if tid == 7 {
                row.replace(r#" cs="1""#, "")
            } else {
                row
            }
        })
        .collect::<Vec<_>>();
    listing(2, &rows)
}

/// Two listing pages, 20 and 5 rows, 24 of them usable.
fn forum() -> FakeForum {
    let second = (21..=25).map(|tid| row(tid, &updated(tid))).collect::<Vec<_>>();
    let mut forum = FakeForum::default()
        .page(SECTION_URL, first_page(None))
        .page("https://bbs.example.org/forum-85-2.html", listing(2, &second));
    for tid in 1..=25 {
        forum = forum.page(&thread_url(tid), thread_page(tid, "正文正文", None));
    }
    forum
}

fn config(dir: &Path) -> CrawlerConfig {
    CrawlerConfig {
        table_file: dir.join("data.csv"),
        index_file: Some(dir.join("index.json")),
        page_workers: 4,
        thread_workers: 4,
        section_workers: 2,
        ..Default::default()
    }
}

fn crawler(dir: &Path, forum: FakeForum) -> Crawler<FakeForum> {
    let config = config(dir);
    let store = MergeStore::open(&config.table_file, config.index_path()).unwrap();
    Crawler::new(forum, Arc::new(store), config)
}

#[tokio::test]
async fn crawl_then_recrawl_without_changes() {
    let dir = tempfile::tempdir().unwrap();

    let crawler1 = crawler(dir.path(), forum());
    let report = crawler1.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.failed_pages, 0);
    assert_eq!(report.threads, 24);
    assert_eq!(report.fetched, 24);
    assert_eq!(report.outcome.inserted, 24);
    assert_eq!(crawler1.source().fetches().len(), 2 + 24);

    let records = crawler1.store().table().records().unwrap();
    assert_eq!(records.len(), 24);
    assert!(records.iter().all(|r| r.tid().as_deref() != Some("20")));
    let first = records.iter().find(|r| r.tid().as_deref() == Some("1")).unwrap();
    assert_eq!(first.title, "故事1");
    assert_eq!(first.author, "作者1");
    assert_eq!(first.view_count, 11);
    assert_eq!(first.recommend_count, 3);
    assert_eq!(first.favorite_count, 4);
    assert_eq!(first.word_count, 4);
    assert_eq!(first.section, "长篇");
    assert_eq!(crawler1.store().update_index().len(), 24);

    let table = std::fs::read(dir.path().join("data.csv")).unwrap();
    let index = std::fs::read(dir.path().join("index.json")).unwrap();
    drop(crawler1);

    // A fresh process reading the files back fetches listings only.
    let crawler2 = crawler(dir.path(), forum());
    let report = crawler2.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.outcome.written(), 0);
    assert_eq!(
        crawler2.source().fetches(),
        [SECTION_URL, "https://bbs.example.org/forum-85-2.html"]
    );
    assert_eq!(std::fs::read(dir.path().join("data.csv")).unwrap(), table);
    assert_eq!(std::fs::read(dir.path().join("index.json")).unwrap(), index);
}

#[tokio::test]
async fn updated_thread_is_refetched_in_place() {
    let dir = tempfile::tempdir().unwrap();
    crawler(dir.path(), forum())
        .crawl_section("长篇", SECTION_URL)
        .await
        .unwrap();

    let bumped = "2023-6-30 23:59";
    let forum = forum()
        .page(SECTION_URL, first_page(Some((5, bumped))))
        .page(&thread_url(5), thread_page(5, "更长的正文内容", None));

    let crawler = crawler(dir.path(), forum);
    let report = crawler.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.outcome.updated, 1);
    assert!(crawler.source().fetches().contains(&thread_url(5)));

    let records = crawler.store().table().records().unwrap();
    assert_eq!(records.len(), 24);
    assert_eq!(records[4].tid().as_deref(), Some("5"));
    assert_eq!(records[4].word_count, 7);
    assert_eq!(records[4].update_time, Timestamp::parse(bumped).unwrap());
}

#[tokio::test]
async fn failed_listing_page_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let forum = FakeForum::default()
        .page(SECTION_URL, listing(3, &[row(1, &updated(1))]))
        .page("https://bbs.example.org/forum-85-3.html", listing(3, &[row(3, &updated(3))]))
        .page(&thread_url(1), thread_page(1, "一", None))
        .page(&thread_url(3), thread_page(3, "三", None));

    let crawler = crawler(dir.path(), forum);
    let report = crawler.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.failed_pages, 1);
    assert_eq!(report.outcome.inserted, 2);
}

#[tokio::test]
async fn failed_thread_is_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut missing_thread = forum();
    missing_thread.pages.remove(&thread_url(7));

    let crawler1 = crawler(dir.path(), missing_thread);
    let report = crawler1.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.fetched, 23);
    assert_eq!(report.failed_threads, 1);
    assert_eq!(crawler1.store().update_index().get("7"), None);
    drop(crawler1);

    let crawler2 = crawler(dir.path(), forum());
    let report = crawler2.crawl_section("长篇", SECTION_URL).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.outcome.inserted, 1);
    assert_eq!(crawler2.store().table().records().unwrap().len(), 24);
}

#[tokio::test]
async fn thread_pages_are_followed() {
    let dir = tempfile::tempdir().unwrap();
    let second = "https://bbs.example.org/forum.php?mod=viewthread&tid=1&page=2&authorid=42";
    let forum = FakeForum::default()
        .page(SECTION_URL, listing(1, &[row(1, &updated(1))]))
        .page(
            &thread_url(1),
            thread_page(1, "第一页", Some("forum.php?mod=viewthread&amp;tid=1&amp;page=2&amp;authorid=42")),
        )
        // Loops back to itself: fetched once.
        .page(
            second,
            thread_page(1, "第二页内容", Some("forum.php?mod=viewthread&amp;tid=1&amp;page=2&amp;authorid=42")),
        );

    let mut config = config(dir.path());
    config.artifact_dir = Some(dir.path().join("texts"));
    let store = MergeStore::open(&config.table_file, config.index_path()).unwrap();
    let crawler = Crawler::new(forum, Arc::new(store), config);

    crawler.crawl_section("长篇", SECTION_URL).await.unwrap();
    let fetches = crawler.source().fetches();
    assert_eq!(fetches.iter().filter(|url| url.as_str() == second).count(), 1);

    let records = crawler.store().table().records().unwrap();
    assert_eq!(records[0].word_count, 3 + 5);
    let text = std::fs::read_to_string(dir.path().join("texts").join("长篇").join("1_故事1.txt")).unwrap();
    assert_eq!(text, "第一页\n第二页内容");
}

#[tokio::test]
async fn failed_section_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    let crawler = crawler(dir.path(), forum());

    let mut sections = BTreeMap::new();
    sections.insert("长篇".to_string(), SECTION_URL.to_string());
    sections.insert(
        "短篇".to_string(),
        "https://bbs.example.org/forum-86-1.html".to_string(),
    );

    let summary = crawler.crawl_sections(&sections).await.unwrap();
    assert_eq!(summary.sections.len(), 1);
    assert_eq!(summary.sections[0].name, "长篇");
    assert_eq!(summary.sections[0].outcome.inserted, 24);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "短篇");
    assert!(matches!(
        summary.failed[0].1,
        CrawlError::Network(FetchError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn concurrent_sections_share_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let short_url = "https://bbs.example.org/forum-86-1.html";
    let short_rows = (101..=103).map(|tid| row(tid, &updated(tid))).collect::<Vec<_>>();
    let mut both = forum().page(short_url, listing(1, &short_rows));
    for tid in 101..=103 {
        both = both.page(&thread_url(tid), thread_page(tid, "短", None));
    }

    let mut sections = BTreeMap::new();
    sections.insert("长篇".to_string(), SECTION_URL.to_string());
    sections.insert("短篇".to_string(), short_url.to_string());

    let crawler1 = crawler(dir.path(), both);
    let summary = crawler1.crawl_sections(&sections).await.unwrap();
    assert!(summary.failed.is_empty());
    let inserted = summary
        .sections
        .iter()
        .map(|report| (report.name.as_str(), report.outcome.inserted))
        .collect::<Vec<_>>();
    assert_eq!(inserted, [("短篇", 3), ("长篇", 24)]);
    assert_eq!(crawler1.store().table().records().unwrap().len(), 27);
    assert_eq!(crawler1.store().update_index().len(), 27);
    drop(crawler1);

    let mut both = forum().page(short_url, listing(1, &short_rows));
    for tid in 101..=103 {
        both = both.page(&thread_url(tid), thread_page(tid, "短", None));
    }
    let crawler2 = crawler(dir.path(), both);
    let summary = crawler2.crawl_sections(&sections).await.unwrap();
    assert!(summary.sections.iter().all(|report| report.fetched == 0));
    assert_eq!(crawler2.source().fetches().len(), 3);
}

#[tokio::test]
async fn listing_without_page_count_fails_the_section() {
    let dir = tempfile::tempdir().unwrap();
    let forum = FakeForum::default().page(
        SECTION_URL,
        "<html><body><p>请先登录</p></body></html>".to_string(),
    );
    let crawler = crawler(dir.path(), forum);
    assert!(matches!(
        crawler.crawl_section("长篇", SECTION_URL).await,
        Err(CrawlError::Parse { .. })
    ));
}
