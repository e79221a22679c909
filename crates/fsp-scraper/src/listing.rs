//! Section listing pages.
//!
//! A listing page is read column by column: the counts cells, the bylines
//! (author and creation time), the subject links (title, tid, update time) and
//! finally the author uids. Columns are aligned by row index. A cell that can't
//! be read yields a [`PartialFieldError`]; rows whose identity columns failed
//! are left out of the result, the others keep a sentinel value.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Class, Name, Predicate};

use crate::error::{Column, ParseError, PartialFieldError};
use crate::model::{canonical_url, ThreadSummary, Timestamp, UNKNOWN_AUTHOR};
use crate::page::{clean_title, tid_from_url};

lazy_static! {
    static ref PAGE_COUNT: Regex = Regex::new(r"共\s*(\d+)\s*页").unwrap();
    static ref UPDATE_NOTE_TIME: Regex = Regex::new(
        r"\[(?:最后更新|Last update):\s*(\d{4}-\d{1,2}-\d{1,2}\s+\d{1,2}:\d{1,2})\]"
    )
    .unwrap();
    static ref UID: Regex = Regex::new(r"uid[-=]([^.&]+)").unwrap();
}

/// Threads read from one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub summaries: Vec<ThreadSummary>,
    pub failures: Vec<PartialFieldError>,
}

impl ListingPage {
    /// Rows left out of `summaries`.
    pub fn dropped_rows(&self) -> BTreeSet<usize> {
        self.failures
            .iter()
            .filter(|f| f.column.drops_row())
            .map(|f| f.row)
            .collect()
    }
}

/// Reads the total number of pages from the `共 N 页` pager marker.
pub fn page_count(markup: &str) -> Result<u32, ParseError> {
    Document::from(markup)
        .find(Name("span"))
        .filter_map(|span| span.attr("title"))
        .find_map(|title| {
            PAGE_COUNT
                .captures(title)
                .and_then(|caps| caps[1].parse().ok())
        })
        .ok_or(ParseError::MissingPageCount)
}

/// Parses the threads of a listing page. `host` is used to build canonical thread URLs.
pub fn parse_listing(
    markup: &str,
    page_number: u32,
    host: &str,
) -> Result<ListingPage, ParseError> {
    let document = Document::from(markup);
    let subjects = document
        .find(Name("a").and(Class("s")).and(Class("xst")))
        .collect::<Vec<_>>();
    if subjects.is_empty() {
        return Err(ParseError::NoThreadLinks);
    }

    let mut failures = vec![];

    let counts = document
        .find(Class("acgifnums"))
        .enumerate()
        .map(|(row, cell)| {
            read_counts(cell).unwrap_or_else(|reason| {
                failures.push(PartialFieldError::new(row, Column::Counts, reason));
                (0, 0)
            })
        })
        .collect::<Vec<_>>();

    let bylines = document
        .find(Name("div").and(Class("acgifby1")))
        .enumerate()
        .map(|(row, cell)| read_byline(row, cell, &mut failures))
        .collect::<Vec<_>>();

    let subjects = subjects
        .into_iter()
        .enumerate()
        .map(|(row, link)| read_subject(row, link, &mut failures))
        .collect::<Vec<_>>();

    let mut uid_links = document
        .find(Name("a").and(Attr("cs", "1")))
        .filter_map(|link| link.attr("href"))
        .filter(|href| href.contains("uid"))
        .collect::<Vec<_>>();
    // The first page lists the administrator of the pinned announcement,
    // which has no row of its own.
    if page_number == 1 && uid_links.len() > subjects.len() {
        uid_links.remove(0);
    }

    let mut rows = vec![];
    for (row, subject) in subjects.into_iter().enumerate() {
        let (comment_count, view_count) = counts.get(row).copied().unwrap_or_else(|| {
            failures.push(PartialFieldError::new(row, Column::Counts, "missing cell"));
            (0, 0)
        });

        let (author, create_time) = bylines.get(row).cloned().unwrap_or_else(|| {
            failures.push(PartialFieldError::new(row, Column::Author, "missing byline"));
            (UNKNOWN_AUTHOR.to_string(), Timestamp::epoch())
        });

        let uid = uid_links
            .get(row)
            .and_then(|href| UID.captures(href))
            .map(|caps| caps[1].to_string());
        let uid = match uid {
            Some(uid) => uid,
            None => {
                failures.push(PartialFieldError::new(row, Column::Uid, "missing author uid"));
                continue;
            }
        };

        let Subject {
            title,
            tid,
            update_time,
        } = subject;
        let Some(tid) = tid else { continue };

        rows.push((
            row,
            ThreadSummary {
                url: canonical_url(host, &tid, &uid),
                tid,
                title,
                author,
                comment_count,
                view_count,
                update_time,
                create_time,
                uid,
            },
        ));
    }

    let page = ListingPage {
        summaries: vec![],
        failures,
    };
    let dropped = page.dropped_rows();
    let summaries = rows
        .into_iter()
        .filter(|(row, _)| !dropped.contains(row))
        .map(|(_, summary)| summary)
        .collect();

    Ok(ListingPage { summaries, ..page })
}

fn read_count(node: Option<Node>, what: &str) -> Result<u64, String> {
    let text = node.map(|n| n.text()).ok_or_else(|| format!("missing {what}"))?;
    let text = text.trim().replace(',', "");
    text.parse()
        .map_err(|e| format!("couldn't read {what} from {text:?}: {e}"))
}

fn read_counts(cell: Node) -> Result<(u64, u64), String> {
    let comments = read_count(
        cell.find(Name("a").and(Class("xi2"))).next(),
        "comment count",
    )?;
    let views = read_count(cell.find(Name("span")).next(), "view count")?;
    Ok((comments, views))
}

fn read_byline(
    row: usize,
    cell: Node,
    failures: &mut Vec<PartialFieldError>,
) -> (String, Timestamp) {
    let author = cell
        .find(Name("a"))
        .next()
        .map(|link| link.text().trim().to_string())
        .filter(|author| !author.is_empty());
    let author = match author {
        Some(author) => author,
        None => {
            failures.push(PartialFieldError::new(row, Column::Author, "missing author link"));
            return (UNKNOWN_AUTHOR.to_string(), Timestamp::epoch());
        }
    };

    let spans = cell.find(Name("span")).collect::<Vec<_>>();
    let created = spans
        .iter()
        .find_map(|span| span.attr("title").map(String::from))
        .or_else(|| spans.first().map(|span| span.text()))
        .unwrap_or_default();
    let create_time = Timestamp::parse(&created).unwrap_or_else(|| {
        failures.push(PartialFieldError::new(
            row,
            Column::CreateTime,
            format!("unreadable create time {created:?}"),
        ));
        Timestamp::epoch()
    });

    (author, create_time)
}

struct Subject {
    title: String,
    tid: Option<String>,
    update_time: Timestamp,
}

fn read_subject(row: usize, link: Node, failures: &mut Vec<PartialFieldError>) -> Subject {
    let text = link.text();

    let tid = link.attr("href").and_then(tid_from_url);
    if tid.is_none() {
        failures.push(PartialFieldError::new(row, Column::Subject, "no tid in link"));
    }

    let updated = link
        .find(Name("span"))
        .find_map(|span| span.attr("title").map(String::from))
        .or_else(|| {
            UPDATE_NOTE_TIME
                .captures(&text)
                .map(|caps| caps[1].to_string())
        });
    let update_time = match updated.as_deref().and_then(Timestamp::parse) {
        Some(ts) => ts,
        None => {
            failures.push(PartialFieldError::new(
                row,
                Column::UpdateTime,
                format!("unreadable update time {updated:?}"),
            ));
            Timestamp::epoch()
        }
    };

    Subject {
        title: clean_title(&text),
        tid,
        update_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "bbs.example.org";

    fn row(tid: u32, uid: u32) -> String {
        format!(
            r#"<tbody id="normalthread_{tid}"><tr>
<th><a href="thread-{tid}-1-1.html" class="s xst">故事{tid}<span title="2023-5-{day} 10:00">[最后更新: 2023-5-{day} 10:00]</span></a></th>
<td class="by"><div class="acgifby1"><a href="space-uid-{uid}.html" cs="1">作者{uid}</a><span title="2023-4-1 09:00">2023-4-1</span></div></td>
<td class="num"><div class="acgifnums"><a href="thread-{tid}-1-1.html" class="xi2">1{tid}</a><span>2{tid}</span></div></td>
</tr></tbody>"#,
            day = tid % 28 + 1
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body><div id="pgt"><span title="共 3 页"> / 3 页</span></div><table>{}</table></body></html>"#,
            rows.join("\n")
        )
    }

    #[test]
    fn reads_every_column() {
        let markup = page(&[row(101, 7), row(102, 8)]);
        let listing = parse_listing(&markup, 2, HOST).unwrap();

        assert!(listing.failures.is_empty(), "{:?}", listing.failures);
        assert_eq!(listing.summaries.len(), 2);

        let first = &listing.summaries[0];
        assert_eq!(first.tid, "101");
        assert_eq!(first.title, "故事101");
        assert_eq!(first.author, "作者7");
        assert_eq!(first.uid, "7");
        assert_eq!(first.comment_count, 1101);
        assert_eq!(first.view_count, 2101);
        assert_eq!(first.update_time.to_string(), "2023-05-18 10:00");
        assert_eq!(first.create_time.to_string(), "2023-04-01 09:00");
        assert_eq!(
            first.url,
            "https://bbs.example.org/forum.php?mod=viewthread&tid=101&page=1&authorid=7"
        );
    }

    #[test]
    fn missing_counts_keep_the_row() {
        let broken = row(102, 8).replace(
            r#"<a href="thread-102-1-1.html" class="xi2">1102</a><span>2102</span>"#,
            "",
        );
        let markup = page(&[row(101, 7), broken, row(103, 9)]);
        let listing = parse_listing(&markup, 2, HOST).unwrap();

        assert_eq!(listing.summaries.len(), 3);
        assert_eq!(listing.summaries[1].tid, "102");
        assert_eq!(listing.summaries[1].comment_count, 0);
        assert_eq!(listing.summaries[1].view_count, 0);
        assert_eq!(listing.summaries[1].author, "作者8");
        assert_eq!(listing.summaries[2].view_count, 2103);
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].row, 1);
        assert_eq!(listing.failures[0].column, Column::Counts);
        assert!(listing.dropped_rows().is_empty());
    }

    #[test]
    fn rows_without_tid_are_dropped() {
        let broken = row(102, 8).replace(
            r#"href="thread-102-1-1.html" class="s xst""#,
            r#"href="forum.php?mod=redirect" class="s xst""#,
        );
        let markup = page(&[row(101, 7), broken, row(103, 9)]);
        let listing = parse_listing(&markup, 2, HOST).unwrap();

        let tids = listing.summaries.iter().map(|s| s.tid.as_str()).collect::<Vec<_>>();
        assert_eq!(tids, ["101", "103"]);
        assert_eq!(listing.dropped_rows().into_iter().collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn rows_without_author_are_dropped() {
        let broken = row(102, 8)
            .replace(r#"<a href="space-uid-8.html" cs="1">作者8</a>"#, "");
        let markup = page(&[row(101, 7), broken]).replace(
            "</table>",
            r#"</table><a href="space-uid-8.html" cs="1">作者8</a>"#,
        );
        let listing = parse_listing(&markup, 2, HOST).unwrap();

        assert_eq!(listing.summaries.len(), 1);
        assert_eq!(listing.summaries[0].tid, "101");
        assert!(listing
            .failures
            .iter()
            .any(|f| f.row == 1 && f.column == Column::Author));
    }

    #[test]
    fn administrator_uid_is_skipped_on_first_page() {
        let markup = page(&[row(101, 7), row(102, 8)]).replace(
            r#"<div id="pgt">"#,
            r#"<div class="moderators"><a href="home.php?mod=space&uid=1" cs="1">Admin</a></div><div id="pgt">"#,
        );

        let first = parse_listing(&markup, 1, HOST).unwrap();
        let uids = first.summaries.iter().map(|s| s.uid.as_str()).collect::<Vec<_>>();
        assert_eq!(uids, ["7", "8"]);

        // Not a first page: uids are zipped as they come.
        let other = parse_listing(&markup, 2, HOST).unwrap();
        let uids = other.summaries.iter().map(|s| s.uid.as_str()).collect::<Vec<_>>();
        assert_eq!(uids, ["1", "7"]);
    }

    #[test]
    fn missing_uid_drops_the_unmatched_row() {
        let broken = row(102, 8).replace(r#" cs="1""#, "");
        let markup = page(&[row(101, 7), broken, row(103, 9)]);
        let listing = parse_listing(&markup, 1, HOST).unwrap();

        // uids shift up by one, the last row is left without one
        let got = listing
            .summaries
            .iter()
            .map(|s| (s.tid.as_str(), s.uid.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(got, [("101", "7"), ("102", "9")]);
        assert!(listing
            .failures
            .iter()
            .any(|f| f.row == 2 && f.column == Column::Uid));
    }

    #[test]
    fn update_time_from_annotation_text() {
        let markup = page(&[row(101, 7).replace(r#"<span title="2023-5-18 10:00">"#, "<span>")]);
        let listing = parse_listing(&markup, 2, HOST).unwrap();
        assert_eq!(
            listing.summaries[0].update_time.to_string(),
            "2023-05-18 10:00"
        );
    }

    #[test]
    fn unreadable_update_time_uses_epoch() {
        let markup = page(&[row(101, 7)
            .replace(r#"<span title="2023-5-18 10:00">[最后更新: 2023-5-18 10:00]</span>"#, "")]);
        let listing = parse_listing(&markup, 2, HOST).unwrap();
        assert_eq!(listing.summaries.len(), 1);
        assert!(listing.summaries[0].update_time.is_epoch());
        assert_eq!(listing.failures[0].column, Column::UpdateTime);
    }

    #[test]
    fn page_without_links_is_an_error() {
        let markup = page(&[]);
        assert_eq!(
            parse_listing(&markup, 1, HOST),
            Err(ParseError::NoThreadLinks)
        );
    }

    #[test]
    fn page_count_from_pager() {
        assert_eq!(page_count(&page(&[row(101, 7)])), Ok(3));
        assert_eq!(
            page_count("<html><body></body></html>"),
            Err(ParseError::MissingPageCount)
        );
    }
}
