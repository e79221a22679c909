//! Walks every page of a thread and gathers its counters and text.

use std::collections::HashSet;

use fsp_scraper::{parse_thread_page, tid_from_url, ParseError, ThreadContent, ThreadPage};
use reqwest::Url;

use crate::artifact::ArtifactWriter;
use crate::error::CrawlError;
use crate::fetch::PageSource;

pub struct ContentFetcher<'a, S> {
    source: &'a S,
    max_pages: usize,
    artifacts: Option<&'a ArtifactWriter>,
}

impl<'a, S> ContentFetcher<'a, S>
where
    S: PageSource,
{
    pub fn new(source: &'a S, max_pages: usize, artifacts: Option<&'a ArtifactWriter>) -> Self {
        Self {
            source,
            max_pages: max_pages.max(1),
            artifacts,
        }
    }

    /// Never fails: errors are logged and yield [`ThreadContent::failed`].
    pub async fn fetch_thread(&self, url: &str, section: &str) -> ThreadContent {
        match self.try_fetch_thread(url, section).await {
            Ok(content) => content,
            Err(e) => {
                log::error!("Couldn't fetch thread {url} got: {e}");
                ThreadContent::failed()
            }
        }
    }

    async fn try_fetch_thread(&self, url: &str, section: &str) -> Result<ThreadContent, CrawlError> {
        let mut content = ThreadContent::default();
        let mut text = String::new();
        let mut visited = HashSet::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            if visited.len() >= self.max_pages {
                log::warn!("Stopping {url} after {} pages", self.max_pages);
                break;
            }

            let markup = self.source.fetch(&page_url).await?;
            let first_page = visited.is_empty();
            let page = parse_page(markup, first_page)
                .await?
                .map_err(|e| CrawlError::parse(&page_url, e))?;

            if let Some(head) = page.head.as_ref() {
                content.title = head.title.clone();
                content.recommend_count = head.recommend_count;
                content.favorite_count = head.favorite_count;
            }
            content.word_count += page.word_count;
            if !page.blocks.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&page.text());
            }

            if let Some(href) = &page.next_page {
                let resolved = resolve(&page_url, href)?;
                if !visited.contains(&resolved) && resolved != page_url {
                    next = Some(resolved);
                }
            }
            visited.insert(page_url);
        }

        if let Some(artifacts) = self.artifacts {
            match artifacts.write(section, tid_from_url(url).as_deref(), &content.title, &text) {
                Ok(path) => content.body_artifact = Some(path),
                Err(e) => log::warn!("Couldn't save text of {url} got: {e}"),
            }
        }

        content.complete = true;
        Ok(content)
    }
}

async fn parse_page(
    markup: String,
    first_page: bool,
) -> Result<Result<ThreadPage, ParseError>, CrawlError> {
    let page = tokio::task::spawn_blocking(move || parse_thread_page(&markup, first_page)).await?;
    Ok(page)
}

/// Resolves a link as written in `base` into an absolute URL.
pub(crate) fn resolve(base: &str, href: &str) -> Result<String, CrawlError> {
    let invalid = |reason: String| {
        CrawlError::parse(
            base,
            ParseError::InvalidUrl {
                url: href.to_string(),
                reason,
            },
        )
    };
    let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let url = base.join(href).map_err(|e| invalid(e.to_string()))?;
    Ok(url.to_string())
}
