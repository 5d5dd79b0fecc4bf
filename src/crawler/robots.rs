use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use url::Url;

use super::fetcher::Download;

/// Cached robots policies are refreshed after this age.
pub const MAX_ROBOTS_CACHE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct RobotsRule {
    allow: bool,
    path: String,
}

/// Parsed robots.txt rules, grouped by lowercase user-agent.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    rules: HashMap<String, Vec<RobotsRule>>,
}

impl RobotsPolicy {
    pub fn parse(content: &str) -> Self {
        let mut rules: HashMap<String, Vec<RobotsRule>> = HashMap::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_rule_block = false;

        for line in content.lines() {
            let line = match line.find('#') {
                Some(idx) => line[..idx].trim(),
                None => line.trim(),
            };
            if line.is_empty() {
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim();

                match key.as_str() {
                    "user-agent" => {
                        // Consecutive user-agent lines share the rules that
                        // follow; a user-agent after rules starts a new group.
                        if in_rule_block {
                            current_agents.clear();
                            in_rule_block = false;
                        }
                        current_agents.push(value.to_lowercase());
                    }
                    "disallow" | "allow" => {
                        in_rule_block = true;
                        if value.is_empty() {
                            // "Disallow:" with no value permits everything.
                            continue;
                        }
                        for agent in &current_agents {
                            rules.entry(agent.clone()).or_default().push(RobotsRule {
                                allow: key == "allow",
                                path: value.to_string(),
                            });
                        }
                    }
                    _ => {
                        // Crawl-delay, Sitemap, etc. are out of scope.
                    }
                }
            }
        }

        RobotsPolicy { rules }
    }

    /// Standard allow/disallow matching: the longest rule path that
    /// prefixes the URL path wins; Allow wins length ties; no matching
    /// rule means the URL is permitted.
    pub fn can_fetch(&self, user_agent: &str, url: &str) -> bool {
        let path = match Url::parse(url) {
            Ok(u) => {
                let mut p = u.path().to_string();
                if let Some(q) = u.query() {
                    p.push('?');
                    p.push_str(q);
                }
                p
            }
            Err(_) => return true,
        };

        let ua = user_agent.to_lowercase();
        let group = self
            .rules
            .get(&ua)
            .or_else(|| self.rules.get("*"));

        let Some(group) = group else {
            return true;
        };

        let mut verdict = true;
        let mut best_len = 0;
        for rule in group {
            if path.starts_with(&rule.path) {
                let len = rule.path.len();
                if len > best_len || (len == best_len && rule.allow) {
                    best_len = len;
                    verdict = rule.allow;
                }
            }
        }
        verdict
    }
}

struct CacheEntry {
    policy: Option<RobotsPolicy>,
    fetched_at: Instant,
}

/// Per-origin robots.txt cache. The first URL seen on an origin triggers
/// a fetch of `scheme://host/robots.txt`; failures cache as "no policy",
/// which allows everything. Entries refresh after `MAX_ROBOTS_CACHE_AGE`.
pub struct RobotsCache {
    downloader: Arc<dyn Download>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RobotsCache {
    pub fn new(downloader: Arc<dyn Download>) -> Self {
        RobotsCache {
            downloader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the wildcard agent may fetch the URL. Fails open: any
    /// parse or fetch problem permits the URL.
    pub fn allowed(&self, url: &str) -> bool {
        let origin = match origin_of(url) {
            Some(o) => o,
            None => return true,
        };

        // The lock is held across fetch+insert so one worker resolves an
        // origin while the rest wait for the cached answer.
        let mut entries = self.entries.lock().expect("robots lock poisoned");

        let stale = match entries.get(&origin) {
            Some(entry) => entry.fetched_at.elapsed() > MAX_ROBOTS_CACHE_AGE,
            None => true,
        };
        if stale {
            let policy = self.fetch_policy(&origin);
            entries.insert(
                origin.clone(),
                CacheEntry {
                    policy,
                    fetched_at: Instant::now(),
                },
            );
        }

        match entries.get(&origin).and_then(|e| e.policy.as_ref()) {
            Some(policy) => policy.can_fetch("*", url),
            None => true,
        }
    }

    fn fetch_policy(&self, origin: &str) -> Option<RobotsPolicy> {
        let robots_url = format!("{origin}/robots.txt");
        match self.downloader.download(&robots_url) {
            Ok(response) if response.status == 200 => Some(RobotsPolicy::parse(
                &String::from_utf8_lossy(&response.body),
            )),
            Ok(response) => {
                tracing::debug!(
                    origin = %origin,
                    status = response.status,
                    "no robots.txt, allowing all"
                );
                None
            }
            Err(e) => {
                tracing::debug!(origin = %origin, error = %e, "robots fetch failed, allowing all");
                None
            }
        }
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}
