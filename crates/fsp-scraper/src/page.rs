//! Helpers shared by listing and thread pages.

use lazy_static::lazy_static;
use regex::Regex;
use select::document::Document;
use select::predicate::{Attr, Class};

lazy_static! {
    static ref TID_QUERY: Regex = Regex::new(r"tid=(\d+)").unwrap();
    static ref TID_PATH: Regex = Regex::new(r"thread-(\d+)-").unwrap();
    static ref UPDATE_NOTE: Regex = Regex::new(r"\[(?:最后更新|Last update)[^\]]*\]").unwrap();
}

const FORBIDDEN_TITLE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Extracts the thread identifier from either URL style the forum uses,
/// `forum.php?mod=viewthread&tid=123` or `thread-123-1-1.html`.
pub fn tid_from_url(url: &str) -> Option<String> {
    TID_QUERY
        .captures(url)
        .or_else(|| TID_PATH.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Drops the `[最后更新: ...]` annotation and characters that cannot appear in file names.
pub fn clean_title(text: &str) -> String {
    let text = UPDATE_NOTE.replace_all(text, "");
    text.replace(FORBIDDEN_TITLE_CHARS, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The error notice the forum renders in place of content (login required, thread removed...).
pub fn forum_message(markup: &str) -> Option<String> {
    if !markup.contains("messagetext") {
        return None;
    }
    let document = Document::from(markup);
    let notice = document.find(Attr("id", "messagetext")).next()?;
    let mut message = notice.text();
    if let Some(sibling) = notice.next() {
        message.push_str(&sibling.text());
    }
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(message)
}

/// Href of the "next page" link, as written in the page.
pub(crate) fn next_page_href(document: &Document) -> Option<String> {
    document
        .find(Class("nxt"))
        .find_map(|link| link.attr("href"))
        .map(String::from)
}
