use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::stopwords;

/// Per-page contribution of a single token is capped at this count to
/// resist token-stuffing.
pub const MAX_WORD_PER_PAGE: u64 = 50;
/// Number of entries emitted in the top-words section of the report.
pub const TOP_WORDS: usize = 50;

const SUBDOMAIN_SUFFIX: &str = "uci.edu";
const ROOT_SUBDOMAIN_KEY: &str = "(root)";

#[derive(Default)]
struct ReportState {
    unique_urls: HashSet<String>,
    longest_page: Option<(String, usize)>,
    word_counter: HashMap<String, u64>,
    subdomain_counter: BTreeMap<String, u64>,
}

/// Process-wide sink for crawl statistics: unique page count, longest
/// page by token count, capped global token frequencies, and per-
/// subdomain page counts for the uci.edu space. One instance is shared
/// by all workers; every operation takes the single report lock.
pub struct Report {
    state: Mutex<ReportState>,
    stopwords: Arc<HashSet<String>>,
}

impl Report {
    pub fn new(stopwords: Arc<HashSet<String>>) -> Self {
        Report {
            state: Mutex::new(ReportState::default()),
            stopwords,
        }
    }

    /// Record one successfully scraped page from its pre-tokenized text.
    /// Call at most once per unique page; deduplication upstream is what
    /// makes the unique-page count honest.
    pub fn process_page_tokens(&self, url: &str, tokens: &[String]) {
        let url = strip_fragment(url);
        let mut state = self.state.lock().expect("report lock poisoned");

        state.unique_urls.insert(url.clone());

        let word_count = tokens.len();
        let longest = state.longest_page.as_ref().map(|(_, n)| *n).unwrap_or(0);
        if word_count > longest {
            state.longest_page = Some((url.clone(), word_count));
        }

        let mut page_frequencies: HashMap<&str, u64> = HashMap::new();
        for token in tokens {
            if is_valid_word(token) {
                *page_frequencies.entry(token.as_str()).or_insert(0) += 1;
            }
        }
        for (token, count) in page_frequencies {
            *state.word_counter.entry(token.to_string()).or_insert(0) +=
                count.min(MAX_WORD_PER_PAGE);
        }

        if let Some(key) = subdomain_key(&url) {
            *state.subdomain_counter.entry(key).or_insert(0) += 1;
        }
    }

    /// Convenience entry point for raw text; tokenizes with the same
    /// rules as the scrape pipeline.
    pub fn process_page_text(&self, url: &str, text: &str) {
        let tokens = stopwords::tokenize(text, &self.stopwords);
        self.process_page_tokens(url, &tokens);
    }

    pub fn unique_count(&self) -> usize {
        self.state.lock().expect("report lock poisoned").unique_urls.len()
    }

    pub fn longest_page(&self) -> Option<(String, usize)> {
        self.state
            .lock()
            .expect("report lock poisoned")
            .longest_page
            .clone()
    }

    /// Up to `k` (token, count) pairs, count descending. Ties are broken
    /// by lexicographic token order so the report is deterministic.
    pub fn top_words(&self, k: usize) -> Vec<(String, u64)> {
        let state = self.state.lock().expect("report lock poisoned");
        let mut entries: Vec<(String, u64)> = state
            .word_counter
            .iter()
            .map(|(w, c)| (w.clone(), *c))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(k);
        entries
    }

    /// (subdomain, page count) pairs sorted by subdomain key ascending.
    pub fn subdomains(&self) -> Vec<(String, u64)> {
        let state = self.state.lock().expect("report lock poisoned");
        state
            .subdomain_counter
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Emit the final crawl report through the log.
    pub fn generate_report(&self) {
        let state = self.state.lock().expect("report lock poisoned");

        tracing::info!("====");
        tracing::info!("CRAWLER REPORT");
        tracing::info!("====");
        tracing::info!("Total unique pages: {}", state.unique_urls.len());
        match &state.longest_page {
            Some((url, words)) => tracing::info!("Longest page: {url} ({words} words)"),
            None => tracing::info!("Longest page: (none) (0 words)"),
        }

        tracing::info!("Top {TOP_WORDS} words:");
        let mut entries: Vec<(&String, &u64)> = state.word_counter.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (word, count) in entries.into_iter().take(TOP_WORDS) {
            tracing::info!("  {word}: {count}");
        }

        tracing::info!("UCI subdomains:");
        for (subdomain, count) in &state.subdomain_counter {
            tracing::info!("  {subdomain}.{SUBDOMAIN_SUFFIX}: {count} pages");
        }
        tracing::info!("====");
    }
}

fn strip_fragment(url: &str) -> String {
    match url.split_once('#') {
        Some((before, _)) => before.to_string(),
        None => url.to_string(),
    }
}

/// Reject tokens that are likely rendering artifacts rather than words:
/// overlong runs, low character diversity, and doubled halves.
fn is_valid_word(word: &str) -> bool {
    let length = word.len();
    if length > 20 {
        return false;
    }
    if length >= 3 {
        let distinct: HashSet<char> = word.chars().collect();
        if distinct.len() <= 2 {
            return false;
        }
    }
    if length >= 6 {
        let half = length / 2;
        if word[..half] == word[half..2 * half] {
            return false;
        }
    }
    true
}

/// Subdomain bucket for hosts in the uci.edu space: any host ending in
/// `uci.edu` counts, and the key is the host with the last 8 characters
/// (".uci.edu") cut off. Hosts too short to carry that suffix, the apex
/// included, bucket under `(root)`.
fn subdomain_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !host.ends_with(SUBDOMAIN_SUFFIX) {
        return None;
    }
    let cut = host.len().saturating_sub(SUBDOMAIN_SUFFIX.len() + 1);
    let prefix = host.get(..cut).unwrap_or("");
    if prefix.is_empty() {
        Some(ROOT_SUBDOMAIN_KEY.to_string())
    } else {
        Some(prefix.to_string())
    }
}
