use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::report::Report;
use crate::stopwords;

use super::dedup::{content_checksum, simhash64, DedupCache};
use super::fetcher::Response;
use super::robots::RobotsCache;
use super::traps::TrapDetector;
use super::urls;

/// Pages with less visible text than this are noise.
pub const MIN_CHARS: usize = 75;
/// Pages with fewer tokens than this carry no useful signal.
pub const MIN_TOKENS: usize = 25;
/// How much of the body the binary sniff inspects.
const BINARY_SNIFF_BYTES: usize = 8192;

const SUPPORTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

/// Tags whose contents are never visible text.
const STRIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "embed", "svg", "canvas", "meta", "link",
];

const SKIPPED_HREF_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// Why a well-formed response produced no page. These count as fully
/// processed: the worker marks the URL complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RobotsDisallowed,
    UnsupportedContentType,
    BinaryContent,
    TooShort,
    TooFewTokens,
    Duplicate,
}

/// Outcome of scraping a downloadable response.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// The page was counted and these outbound links survived
    /// normalization, validation, and trap checks.
    Accepted(Vec<String>),
    /// The page was examined and discarded; no links are followed.
    Rejected(RejectReason),
}

/// A response that could not be processed at all. The URL stays pending
/// so a restart retries it.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("unexpected status {0}")]
    BadStatus(u16),
    #[error("response carried no body")]
    EmptyBody,
}

/// The per-page pipeline: validate the response, extract and tokenize
/// visible text, suppress duplicates, feed the report, and emit the
/// filtered outbound links.
pub struct Scraper {
    robots: Arc<RobotsCache>,
    dedup: Arc<DedupCache>,
    traps: Arc<TrapDetector>,
    report: Arc<Report>,
    stopwords: Arc<HashSet<String>>,
    content_div_re: Regex,
}

impl Scraper {
    pub fn new(
        robots: Arc<RobotsCache>,
        dedup: Arc<DedupCache>,
        traps: Arc<TrapDetector>,
        report: Arc<Report>,
        stopwords: Arc<HashSet<String>>,
    ) -> Self {
        Scraper {
            robots,
            dedup,
            traps,
            report,
            stopwords,
            content_div_re: Regex::new(r"(?i)content|main|body|post|article")
                .expect("content class pattern must compile"),
        }
    }

    pub fn scrape(&self, url: &str, response: &Response) -> Result<ScrapeOutcome, ScrapeError> {
        if !self.robots.allowed(url) {
            return Ok(ScrapeOutcome::Rejected(RejectReason::RobotsDisallowed));
        }

        if response.status != 200 {
            return Err(ScrapeError::BadStatus(response.status));
        }
        if response.body.is_empty() {
            return Err(ScrapeError::EmptyBody);
        }

        if !supported_content_type(response.header("content-type")) {
            return Ok(ScrapeOutcome::Rejected(RejectReason::UnsupportedContentType));
        }

        let sniff_len = response.body.len().min(BINARY_SNIFF_BYTES);
        if response.body[..sniff_len].contains(&0) {
            return Ok(ScrapeOutcome::Rejected(RejectReason::BinaryContent));
        }

        let html = String::from_utf8_lossy(&response.body);
        let document = Html::parse_document(&html);

        let text = self.extract_visible_text(&document);
        if text.chars().count() < MIN_CHARS {
            return Ok(ScrapeOutcome::Rejected(RejectReason::TooShort));
        }

        let tokens = stopwords::tokenize(&text, &self.stopwords);
        if tokens.len() < MIN_TOKENS {
            return Ok(ScrapeOutcome::Rejected(RejectReason::TooFewTokens));
        }

        let checksum = content_checksum(&text);
        let simhash = simhash64(&tokens);
        if !self.dedup.check_and_insert(checksum, simhash) {
            return Ok(ScrapeOutcome::Rejected(RejectReason::Duplicate));
        }

        self.report.process_page_tokens(url, &tokens);

        let mut links = Vec::new();
        for raw in extract_links(&document, &response.url) {
            let Some(normalized) = urls::normalize(&raw) else {
                continue;
            };
            if urls::is_valid(&normalized) && !self.traps.is_trap(&normalized) {
                links.push(normalized);
            }
        }

        Ok(ScrapeOutcome::Accepted(links))
    }

    /// Visible text of the document: strip non-content tags, prefer the
    /// page's content root (`<main>`, then `<article>`, then the first
    /// content-classed `<div>`, then `<body>`), join text nodes with
    /// spaces, and collapse whitespace runs.
    fn extract_visible_text(&self, document: &Html) -> String {
        let root = self
            .select_first(document, "main")
            .or_else(|| self.select_first(document, "article"))
            .or_else(|| self.find_content_div(document))
            .or_else(|| self.select_first(document, "body"));

        let mut raw = String::new();
        match root {
            Some(element) => collect_visible_text(&element, &mut raw),
            None => collect_visible_text(&document.root_element(), &mut raw),
        }

        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn select_first<'a>(&self, document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
        let sel = Selector::parse(selector).ok()?;
        document.select(&sel).next()
    }

    fn find_content_div<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let sel = Selector::parse("div").ok()?;
        document.select(&sel).find(|div| {
            div.value()
                .attr("class")
                .is_some_and(|class| self.content_div_re.is_match(class))
        })
    }
}

fn supported_content_type(header: Option<&str>) -> bool {
    let Some(value) = header else {
        return true;
    };
    let primary = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    primary.is_empty() || SUPPORTED_CONTENT_TYPES.contains(&primary.as_str())
}

/// Recursively collect text, skipping subtrees rooted at stripped tags.
fn collect_visible_text(node: &ElementRef, out: &mut String) {
    for child in node.children() {
        if let Some(text) = child.value().as_text() {
            out.push(' ');
            out.push_str(text);
        } else if let Some(element) = ElementRef::wrap(child) {
            if !STRIP_TAGS.contains(&element.value().name()) {
                collect_visible_text(&element, out);
            }
        }
    }
}

/// All absolute outbound links from `<a href>` elements, resolved
/// against the response's final URL, fragments stripped. Scheme-relative
/// and relative hrefs are joined; javascript/mailto/tel/data and
/// fragment-only hrefs are skipped.
pub fn extract_links(document: &Html, base_url: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || SKIPPED_HREF_PREFIXES
                .iter()
                .any(|prefix| href.starts_with(prefix))
        {
            continue;
        }

        let resolved = match &base {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        };
        if let Some(mut url) = resolved {
            url.set_fragment(None);
            links.push(url.to_string());
        }
    }
    links
}
