use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2000;
pub const MAX_PATH_DEPTH: usize = 40;
pub const MAX_QUERY_PARAMS: usize = 25;
pub const MAX_CALENDAR_PAGES_PER_DOMAIN: u32 = 250;
pub const MAX_REPETITION_ALLOWED: u32 = 12;
pub const MAX_PATH_QUERIES: u32 = 50;

const ADMIN_PREFIXES: &[&str] = &[
    "/admin/", "/login/", "/logout/", "/.git/", "/.env", "/cgi-bin/",
];
const ADMIN_KEYWORDS: &[&str] = &["wp-admin", "phpmyadmin", "administrator", "backend"];

const TRAP_QUERY_KEYS: &[&str] = &["sessionid", "sid", "token", "auth", "key", "print", "email"];
const DOKU_QUERY_KEYS: &[&str] = &[
    "do", "tab_files", "tab_details", "image", "ns", "rev", "search",
];
const TRAP_ACTION_VALUES: &[&str] = &[
    "edit", "history", "diff", "revisions", "admin", "login", "register", "delete",
];
const PAGINATION_KEYS: &[&str] = &["page", "p", "offset", "start"];
const MAX_PAGINATION_VALUE: i64 = 500;
const MAX_QUERY_VALUE_LENGTH: usize = 20;

#[derive(Default)]
struct TrapCounters {
    calendar_hits: HashMap<String, u32>,
    repetition_hits: HashMap<String, u32>,
    path_visits: HashMap<(String, String), u32>,
}

/// Stateful predicate over URLs that flags patterns known to generate
/// unbounded work: calendars, session-parametrized pages, repeating path
/// cycles, and endlessly revisited paths.
///
/// Counters are per-host and never evicted; they live only for the
/// process lifetime and rebuild after a restart.
pub struct TrapDetector {
    counters: Mutex<TrapCounters>,
    calendar_re: Regex,
}

impl Default for TrapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapDetector {
    pub fn new() -> Self {
        TrapDetector {
            counters: Mutex::new(TrapCounters::default()),
            // /2024, /2024/11, /2024/11/08, optionally slash-terminated
            calendar_re: Regex::new(r"/\d{4}(/\d{1,2}(/\d{1,2})?)?/?$")
                .expect("calendar pattern must compile"),
        }
    }

    /// Whether the URL should be blocked from the frontier. Unparseable
    /// URLs are traps.
    pub fn is_trap(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return true,
        };
        let host = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        let path = parsed.path();

        self.is_too_long(url)
            || self.has_excessive_path_depth(path)
            || self.has_admin_segments(path)
            || self.has_repetitive_pattern(path, &host)
            || self.is_calendar_overused(path, &host)
            || self.is_path_overused(path, &host)
            || self.has_trap_query(&parsed)
    }

    fn is_too_long(&self, url: &str) -> bool {
        url.len() > MAX_URL_LENGTH
    }

    fn has_excessive_path_depth(&self, path: &str) -> bool {
        path.split('/').filter(|s| !s.is_empty()).count() > MAX_PATH_DEPTH
    }

    fn has_admin_segments(&self, path: &str) -> bool {
        let path_lower = path.to_ascii_lowercase();
        if ADMIN_PREFIXES.iter().any(|p| path_lower.starts_with(p)) {
            return true;
        }
        // Raw split: an absolute path leads with an empty segment, so
        // only the first two real segments are inspected.
        path_lower
            .split('/')
            .take(3)
            .any(|segment| ADMIN_KEYWORDS.contains(&segment))
    }

    /// An `a/b/a/b` cycle anywhere in the path counts as a hit; the host
    /// only becomes trapped once its hit counter passes the allowance.
    fn has_repetitive_pattern(&self, path: &str, host: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() < 4 {
            return false;
        }
        for i in 0..parts.len() - 3 {
            if parts[i] == parts[i + 2] && parts[i + 1] == parts[i + 3] {
                let mut counters = self.counters.lock().expect("trap lock poisoned");
                let hits = counters.repetition_hits.entry(host.to_string()).or_insert(0);
                *hits += 1;
                if *hits > MAX_REPETITION_ALLOWED {
                    return true;
                }
            }
        }
        false
    }

    fn is_calendar_overused(&self, path: &str, host: &str) -> bool {
        if !self.calendar_re.is_match(path) {
            return false;
        }
        let mut counters = self.counters.lock().expect("trap lock poisoned");
        let hits = counters.calendar_hits.entry(host.to_string()).or_insert(0);
        *hits += 1;
        *hits > MAX_CALENDAR_PAGES_PER_DOMAIN
    }

    fn is_path_overused(&self, path: &str, host: &str) -> bool {
        let key = (host.to_string(), path.to_ascii_lowercase());
        let mut counters = self.counters.lock().expect("trap lock poisoned");
        let visits = counters.path_visits.entry(key).or_insert(0);
        *visits += 1;
        *visits > MAX_PATH_QUERIES
    }

    fn has_trap_query(&self, parsed: &Url) -> bool {
        if parsed.query().unwrap_or("").is_empty() {
            return false;
        }
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
            .collect();

        if pairs.iter().any(|(k, _)| TRAP_QUERY_KEYS.contains(&k.as_str())) {
            return true;
        }

        if parsed.path().to_ascii_lowercase().contains("doku.php") {
            let doku_hits = pairs
                .iter()
                .filter(|(k, _)| DOKU_QUERY_KEYS.contains(&k.as_str()))
                .count();
            if doku_hits >= 2 {
                return true;
            }
        }

        for (key, value) in &pairs {
            if matches!(key.as_str(), "action" | "do" | "cmd")
                && TRAP_ACTION_VALUES.contains(&value.to_ascii_lowercase().as_str())
            {
                return true;
            }
        }

        for (key, value) in &pairs {
            if PAGINATION_KEYS.contains(&key.as_str()) {
                if let Ok(n) = value.parse::<i64>() {
                    if n > MAX_PAGINATION_VALUE {
                        return true;
                    }
                }
            }
        }

        pairs.len() > MAX_QUERY_PARAMS
            || pairs.iter().any(|(_, v)| v.len() > MAX_QUERY_VALUE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_paths() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("http://ics.uci.edu/admin/dashboard"));
        assert!(traps.is_trap("http://ics.uci.edu/.git/config"));
        assert!(traps.is_trap("http://ics.uci.edu/blog/wp-admin/options"));
        // Keyword matching only reaches the first two real segments.
        assert!(!traps.is_trap("http://ics.uci.edu/a/blog/wp-admin/options"));
        assert!(!traps.is_trap("http://ics.uci.edu/administration-history/"));
    }

    #[test]
    fn test_url_length() {
        let traps = TrapDetector::new();
        let long_url = format!("http://ics.uci.edu/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(traps.is_trap(&long_url));
    }

    #[test]
    fn test_path_depth() {
        let traps = TrapDetector::new();
        let deep = format!("http://ics.uci.edu{}", "/x".repeat(MAX_PATH_DEPTH + 1));
        assert!(traps.is_trap(&deep));
        let shallow = "http://ics.uci.edu/a/b/c/";
        assert!(!traps.is_trap(shallow));
    }

    #[test]
    fn test_calendar_allowance_then_trap() {
        let traps = TrapDetector::new();
        for n in 0..MAX_CALENDAR_PAGES_PER_DOMAIN {
            let url = format!("http://ics.uci.edu/events/2023/11/{n}/");
            assert!(!traps.is_trap(&url), "url {n} should still be allowed");
        }
        // The 251st calendar URL on the same host crosses the allowance.
        assert!(traps.is_trap("http://ics.uci.edu/events/2023/11/250/"));
    }

    #[test]
    fn test_calendar_counter_is_per_host() {
        let traps = TrapDetector::new();
        for n in 0..MAX_CALENDAR_PAGES_PER_DOMAIN {
            let url = format!("http://ics.uci.edu/events/2023/11/{n}/");
            traps.is_trap(&url);
        }
        // A different host starts with a fresh counter.
        assert!(!traps.is_trap("http://cs.uci.edu/events/2023/11/1/"));
    }

    #[test]
    fn test_repetitive_paths_have_allowance() {
        let traps = TrapDetector::new();
        let url = "http://ics.uci.edu/a/b/a/b/";
        for _ in 0..MAX_REPETITION_ALLOWED {
            assert!(!traps.is_trap(url));
        }
        assert!(traps.is_trap(url));
    }

    #[test]
    fn test_path_overuse() {
        let traps = TrapDetector::new();
        let url = "http://ics.uci.edu/listing/";
        for _ in 0..MAX_PATH_QUERIES {
            assert!(!traps.is_trap(url));
        }
        assert!(traps.is_trap(url));
    }

    #[test]
    fn test_session_query_params() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("http://ics.uci.edu/page/?sessionid=abc"));
        assert!(traps.is_trap("http://ics.uci.edu/page/?SID=1"));
        assert!(!traps.is_trap("http://ics.uci.edu/page/?q=rust"));
    }

    #[test]
    fn test_doku_query_params() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("http://ics.uci.edu/wiki/doku.php?do=export&rev=3"));
        assert!(!traps.is_trap("http://ics.uci.edu/wiki/doku.php?id=start"));
    }

    #[test]
    fn test_action_query_values() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("http://ics.uci.edu/wiki/page?action=edit"));
        assert!(traps.is_trap("http://ics.uci.edu/wiki/page?do=Diff"));
        assert!(!traps.is_trap("http://ics.uci.edu/wiki/page?action=view"));
    }

    #[test]
    fn test_pagination_limits() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("http://ics.uci.edu/list?page=501"));
        assert!(!traps.is_trap("http://ics.uci.edu/list?page=500"));
        assert!(!traps.is_trap("http://ics.uci.edu/list?page=notanumber"));
    }

    #[test]
    fn test_query_value_length() {
        let traps = TrapDetector::new();
        let long_value = "x".repeat(MAX_QUERY_VALUE_LENGTH + 1);
        assert!(traps.is_trap(&format!("http://ics.uci.edu/q?term={long_value}")));
    }

    #[test]
    fn test_too_many_query_params() {
        let traps = TrapDetector::new();
        let query: Vec<String> = (0..=MAX_QUERY_PARAMS).map(|i| format!("k{i}=v")).collect();
        let url = format!("http://ics.uci.edu/q?{}", query.join("&"));
        assert!(traps.is_trap(&url));
    }

    #[test]
    fn test_unparseable_is_trap() {
        let traps = TrapDetector::new();
        assert!(traps.is_trap("::not-a-url::"));
    }
}
