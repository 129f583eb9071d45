//! Issue link decorator
//!
//! Turns bare `#1234` references on tracker pages into links to
//! `<origin>/issues/1234`. This is a text heuristic over HTML source, not
//! a parser: only leaf elements (no nested markup) are touched, and anchors
//! are left alone.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Instant;

use regex::{Captures, Regex};
use url::Url;

use crate::error::TrackerError;
use crate::types::Settings;

/// Opening tag directly followed by text holding a 3–5 digit reference.
/// A `#` right after `&` starts a character reference, not an issue.
fn re_candidate() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(\w+)(?:\s[^>]*)?>(?:[^<]*[^<&])?#\d{3,5}").unwrap())
}

/// Element with plain-text content: `<tag attrs>text</tag>`
fn re_leaf() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(\w+)((?:\s[^>]*)?)>([^<]*)</(\w+)\s*>").unwrap())
}

/// `#NNN` not preceded by `&`; group 1 is the preceding character, if any
fn re_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[^&])#(\d{1,5})\b").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorated {
    pub html: String,
    /// Elements whose content was rewritten
    pub converted: usize,
}

/// True when `page_url` lives under the configured tracker host.
pub fn page_matches_host(page_url: &str, host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    page_url.starts_with(host)
}

/// Decoration runs only with `issueFix` on and on the tracker's own pages.
pub fn should_decorate(settings: &Settings, page_url: &str) -> bool {
    settings.issue_fix
        && settings
            .host
            .as_deref()
            .is_some_and(|host| page_matches_host(page_url, host))
}

/// `scheme://host[:port]` of a page URL.
pub fn page_origin(page_url: &str) -> Result<String, TrackerError> {
    let url = Url::parse(page_url)
        .map_err(|e| TrackerError::Configuration(format!("Invalid page URL {}: {}", page_url, e)))?;
    Ok(url.origin().ascii_serialization())
}

fn issue_link(origin: &str, number: &str) -> String {
    format!("<a href=\"{}/issues/{}\">#{}</a>", origin, number, number)
}

/// Rewrite `#NNN` references in `html` into links under `origin`.
pub fn decorate_issue_links(html: &str, origin: &str) -> Decorated {
    let start = Instant::now();

    let tags: HashSet<String> = re_candidate()
        .captures_iter(html)
        .map(|caps| caps[1].to_ascii_lowercase())
        .filter(|tag| tag != "a")
        .collect();

    if tags.is_empty() {
        return Decorated {
            html: html.to_string(),
            converted: 0,
        };
    }

    let mut converted = 0;
    let rewritten = re_leaf().replace_all(html, |caps: &Captures| {
        let whole = caps[0].to_string();
        let tag = caps[1].to_ascii_lowercase();

        if !tag.eq_ignore_ascii_case(&caps[4]) || !tags.contains(&tag) {
            return whole;
        }

        let content = &caps[3];
        if !re_reference().is_match(content) {
            return whole;
        }

        let linked = re_reference().replace_all(content, |r: &Captures| {
            format!("{}{}", &r[1], issue_link(origin, &r[2]))
        });
        converted += 1;
        format!("<{}{}>{}</{}>", &caps[1], &caps[2], linked, &caps[4])
    });
    let html = rewritten.into_owned();

    log::debug!(
        "Link decorator: patching time {:?}; converted {}",
        start.elapsed(),
        converted
    );

    Decorated { html, converted }
}
