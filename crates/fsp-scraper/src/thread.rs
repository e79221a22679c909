//! Thread pages: post bodies, reader counters and pagination.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lazy_static::lazy_static;
use regex::Regex;
use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Class, Name};

use crate::error::ParseError;
use crate::page::{clean_title, next_page_href};

lazy_static! {
    static ref HIDDEN_REPLY: Regex =
        Regex::new(r#"atob\(\s*['"]([A-Za-z0-9+/=\s]+)['"]\s*\)"#).unwrap();
}

const SKIPPED_TAGS: &[&str] = &["br", "img", "a", "i", "script", "style"];

/// Counters only shown on the first page of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHead {
    pub title: String,
    pub recommend_count: u64,
    pub favorite_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub head: Option<ThreadHead>,
    /// Visible text of each post body, a decoded hidden reply first.
    pub blocks: Vec<String>,
    pub word_count: u64,
    pub next_page: Option<String>,
}

impl ThreadPage {
    pub fn text(&self) -> String {
        self.blocks.join("\n")
    }
}

pub fn parse_thread_page(markup: &str, first_page: bool) -> Result<ThreadPage, ParseError> {
    let document = Document::from(markup);

    let head = if first_page {
        Some(read_head(&document)?)
    } else {
        None
    };

    let mut blocks = hidden_replies(&document);
    blocks.extend(document.find(Class("t_f")).map(|body| {
        let mut text = String::new();
        visible_text(body, &mut text);
        text
    }));
    blocks.retain(|block| !block.trim().is_empty());

    let word_count = blocks.iter().map(|block| word_count(block)).sum();

    Ok(ThreadPage {
        head,
        blocks,
        word_count,
        next_page: next_page_href(&document),
    })
}

/// Non whitespace characters.
pub fn word_count(text: &str) -> u64 {
    text.chars().filter(|c| !c.is_whitespace()).count() as u64
}

fn read_head(document: &Document) -> Result<ThreadHead, ParseError> {
    let title = document
        .find(Attr("id", "thread_subject"))
        .next()
        .ok_or(ParseError::MissingElement("#thread_subject"))?
        .text();

    let counter = |id: &str| {
        document
            .find(Attr("id", id))
            .next()
            .and_then(|node| node.text().trim().parse().ok())
            .unwrap_or(0)
    };

    Ok(ThreadHead {
        title: clean_title(&title),
        recommend_count: counter("recommendv_add"),
        favorite_count: counter("favoritenumber"),
    })
}

fn is_hidden(node: &Node) -> bool {
    let Some(name) = node.name() else {
        return false;
    };
    if SKIPPED_TAGS.contains(&name) {
        return true;
    }
    let classes = node.attr("class").unwrap_or_default();
    if classes.split_whitespace().any(|c| c == "jammer") {
        return true;
    }
    if name == "div" && classes.split_whitespace().any(|c| c == "quote") {
        return true;
    }
    node.attr("style")
        .map(|style| style.replace(' ', "").contains("display:none"))
        .unwrap_or(false)
}

fn visible_text(node: Node, out: &mut String) {
    for child in node.children() {
        if let Some(text) = child.as_text() {
            out.push_str(text);
        } else if !is_hidden(&child) {
            visible_text(child, out);
        }
    }
}

/// Some replies are only shipped base64 encoded inside a script and decoded
/// client side.
fn hidden_replies(document: &Document) -> Vec<String> {
    document
        .find(Name("script"))
        .flat_map(|script| {
            let source = script.text();
            HIDDEN_REPLY
                .captures_iter(&source)
                .map(|caps| caps[1].split_whitespace().collect::<String>())
                .collect::<Vec<_>>()
        })
        .filter_map(|encoded| match decode_reply(&encoded) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Skipping hidden reply got: {e}");
                None
            }
        })
        .collect()
}

fn decode_reply(encoded: &str) -> Result<String, String> {
    let bytes = BASE64.decode(encoded).map_err(|e| e.to_string())?;
    let fragment = String::from_utf8(bytes).map_err(|e| e.to_string())?;
    let document = Document::from(fragment.as_str());
    let mut text = String::new();
    if let Some(body) = document.find(Name("body")).next() {
        visible_text(body, &mut text);
    }
    Ok(text)
}
