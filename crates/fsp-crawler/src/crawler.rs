use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::{future, stream, StreamExt};
use fsp_scraper::{page_count, parse_listing, ListingPage, ParseError, ThreadSummary};
use fsp_store::{latest_by_tid, MergeOutcome, MergeStore};
use reqwest::Url;

use crate::artifact::ArtifactWriter;
use crate::config::CrawlerConfig;
use crate::content::ContentFetcher;
use crate::error::CrawlError;
use crate::fetch::PageSource;

/// What crawling one section did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReport {
    pub name: String,
    pub pages: u32,
    pub failed_pages: usize,
    /// Distinct threads listed.
    pub threads: usize,
    pub fetched: usize,
    pub failed_threads: usize,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Default)]
pub struct CrawlSummary {
    pub sections: Vec<SectionReport>,
    /// Sections that failed, with the reason.
    pub failed: Vec<(String, CrawlError)>,
}

pub struct Crawler<S> {
    source: S,
    store: Arc<MergeStore>,
    config: CrawlerConfig,
    artifacts: Option<ArtifactWriter>,
}

impl<S> Crawler<S>
where
    S: PageSource,
{
    pub fn new(source: S, store: Arc<MergeStore>, config: CrawlerConfig) -> Self {
        let artifacts = config.artifact_dir.as_ref().map(ArtifactWriter::new);
        Self {
            source,
            store,
            config,
            artifacts,
        }
    }

    pub fn store(&self) -> &MergeStore {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Crawls every listing page of a section, fetches new or updated
    /// threads and merges them into the store.
    pub async fn crawl_section(&self, name: &str, start_url: &str) -> Result<SectionReport, CrawlError> {
        log::info!("Crawling section {name} from {start_url}");
        let host = host_of(start_url)?;

        let markup = self.source.fetch(start_url).await?;
        let first_host = host.clone();
        let (pages, first) = tokio::task::spawn_blocking(move || {
            let pages = page_count(&markup)?;
            let listing = parse_listing(&markup, 1, &first_host)?;
            Ok::<_, ParseError>((pages, listing))
        })
        .await?
        .map_err(|e| CrawlError::parse(start_url, e))?;
        log_failures(start_url, &first);

        let urls = (2..=pages)
            .map(|page| page_url(start_url, page).map(|url| (page, url)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CrawlError::parse(start_url, e))?;
        let requested = urls.len();

        let host = host.as_str();
        let mut listings = stream::iter(urls)
            .map(|(page, url)| async move {
                self.listing_page(&url, page, host)
                    .await
                    .map(|listing| (page, listing))
                    .map_err(|e| log::warn!("Skipping listing page {url} got: {e}"))
                    .ok()
            })
            .buffer_unordered(self.config.page_workers.max(1))
            .filter_map(future::ready)
            .collect::<Vec<_>>()
            .await;
        let failed_pages = requested - listings.len();
        listings.sort_by_key(|(page, _)| *page);

        let summaries = latest_by_tid(
            first
                .summaries
                .into_iter()
                .chain(listings.into_iter().flat_map(|(_, listing)| listing.summaries)),
            |summary| (summary.tid.clone(), summary.update_time),
        );
        let threads = summaries.len();
        // A merge of another section may hold the store lock for a while.
        let store = Arc::clone(&self.store);
        let known = tokio::task::spawn_blocking(move || store.update_index()).await?;
        let pending = summaries
            .into_iter()
            .filter(|s| known.state(&s.tid, s.update_time).needs_fetch())
            .collect::<Vec<ThreadSummary>>();
        log::info!(
            "Section {name}: {threads} threads on {pages} pages, {} new or updated",
            pending.len()
        );

        let fetcher = ContentFetcher::new(
            &self.source,
            self.config.max_thread_pages,
            self.artifacts.as_ref(),
        );
        let fetcher = &fetcher;
        let mut fetched = stream::iter(pending.into_iter().enumerate())
            .map(|(pos, summary)| async move {
                let content = fetcher.fetch_thread(&summary.url, name).await;
                (pos, summary, content)
            })
            .buffer_unordered(self.config.thread_workers.max(1))
            .collect::<Vec<_>>()
            .await;
        // New rows are appended in listing order whatever the completion order.
        fetched.sort_by_key(|(pos, _, _)| *pos);
        let attempted = fetched.len();
        let complete = fetched
            .into_iter()
            .filter(|(_, _, content)| content.complete)
            .map(|(_, summary, content)| (summary, content))
            .collect::<Vec<_>>();
        let fetched = complete.len();

        let store = Arc::clone(&self.store);
        let section = name.to_string();
        let outcome = tokio::task::spawn_blocking(move || store.merge(&section, complete)).await??;

        Ok(SectionReport {
            name: name.to_string(),
            pages,
            failed_pages,
            threads,
            fetched,
            failed_threads: attempted - fetched,
            outcome,
        })
    }

    /// Crawls sections concurrently. A failing section is reported and the
    /// others go on, a store failure stops the run.
    pub async fn crawl_sections(
        &self,
        sections: &BTreeMap<String, String>,
    ) -> Result<CrawlSummary, CrawlError> {
        let mut err = Ok::<(), CrawlError>(());
        let results = stream::iter(sections)
            .map(|(name, url)| async move {
                match self.crawl_section(name, url).await {
                    Ok(report) => Ok(Ok(report)),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => Ok(Err((name.clone(), e))),
                }
            })
            .buffer_unordered(self.config.section_workers.max(1))
            .scan(&mut err, until_err)
            .collect::<Vec<_>>()
            .await;
        err?;

        let mut summary = CrawlSummary::default();
        for result in results {
            match result {
                Ok(report) => summary.sections.push(report),
                Err(failed) => summary.failed.push(failed),
            }
        }
        summary.sections.sort_by(|a, b| a.name.cmp(&b.name));
        summary.failed.sort_by(|a, b| a.0.cmp(&b.0));

        for report in &summary.sections {
            log::info!(
                "Section {}: {} pages ({} failed), {} threads, {} fetched ({} failed), {}",
                report.name,
                report.pages,
                report.failed_pages,
                report.threads,
                report.fetched,
                report.failed_threads,
                report.outcome
            );
        }
        for (name, e) in &summary.failed {
            log::error!("Section {name} failed: {e}");
        }

        Ok(summary)
    }

    async fn listing_page(&self, url: &str, page: u32, host: &str) -> Result<ListingPage, CrawlError> {
        let markup = self.source.fetch(url).await?;
        let host = host.to_string();
        let listing = tokio::task::spawn_blocking(move || parse_listing(&markup, page, &host))
            .await?
            .map_err(|e| CrawlError::parse(url, e))?;
        log_failures(url, &listing);
        Ok(listing)
    }
}

fn log_failures(url: &str, listing: &ListingPage) {
    for failure in &listing.failures {
        log::warn!("{url}: {failure}");
    }
}

fn until_err<T, E>(
    err: &mut &mut Result<(), E>,
    item: Result<T, E>,
) -> impl Future<Output = Option<T>> {
    match item {
        Ok(item) => future::ready(Some(item)),
        Err(e) => {
            **err = Err(e);
            future::ready(None)
        }
    }
}

fn host_of(url: &str) -> Result<String, CrawlError> {
    let invalid = |reason: String| {
        CrawlError::parse(
            url,
            ParseError::InvalidUrl {
                url: url.to_string(),
                reason,
            },
        )
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    parsed
        .host_str()
        .map(String::from)
        .ok_or_else(|| invalid("no host".to_string()))
}

/// URL of listing page `page` given the URL of the first one: either the
/// `-1.html` path style or a `page=` query parameter.
pub fn page_url(start_url: &str, page: u32) -> Result<String, ParseError> {
    if let Some(prefix) = start_url.strip_suffix("-1.html") {
        return Ok(format!("{prefix}-{page}.html"));
    }

    let mut url = Url::parse(start_url).map_err(|e| ParseError::InvalidUrl {
        url: start_url.to_string(),
        reason: e.to_string(),
    })?;
    let pairs = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());
    Ok(url.to_string())
}
