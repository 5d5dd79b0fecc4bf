use std::sync::Arc;
use std::thread;
use std::time::Duration;

use url::Url;

use super::fetcher::Download;
use super::frontier::Frontier;
use super::politeness::Politeness;
use super::scrape::{ScrapeOutcome, Scraper};

/// How long a worker waits for other threads to refill the frontier
/// before concluding the crawl is over.
const EMPTY_FRONTIER_WAIT: Duration = Duration::from_secs(5);

/// One crawl thread: pops URLs off the frontier, observes per-host
/// politeness, downloads, scrapes, feeds discoveries back, and marks the
/// URL complete. Any failure leaves the URL pending in the durable store
/// so a restart can retry it.
pub struct Worker {
    id: usize,
    frontier: Arc<Frontier>,
    scraper: Arc<Scraper>,
    politeness: Arc<Politeness>,
    downloader: Arc<dyn Download>,
}

impl Worker {
    pub fn new(
        id: usize,
        frontier: Arc<Frontier>,
        scraper: Arc<Scraper>,
        politeness: Arc<Politeness>,
        downloader: Arc<dyn Download>,
    ) -> Self {
        Worker {
            id,
            frontier,
            scraper,
            politeness,
            downloader,
        }
    }

    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name(format!("worker-{}", self.id))
            .spawn(move || self.run())
            .expect("failed to spawn worker thread")
    }

    fn run(self) {
        loop {
            let url = match self.next_url() {
                Some(url) => url,
                None => break,
            };
            self.process(&url);
        }
        tracing::info!(worker = self.id, "frontier is empty, worker stopping");
    }

    /// Pop the next pending URL. An empty queue gets one grace period in
    /// case other workers are still discovering links.
    fn next_url(&self) -> Option<String> {
        if let Some(url) = self.frontier.get_tbd_url() {
            return Some(url);
        }
        thread::sleep(EMPTY_FRONTIER_WAIT);
        self.frontier.get_tbd_url()
    }

    fn process(&self, url: &str) {
        let host = host_of(url);
        self.politeness.wait(&host);

        let response = match self.downloader.download(url) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "download failed, url left pending");
                return;
            }
        };
        tracing::info!(url = %url, status = response.status, "downloaded");

        match self.scraper.scrape(url, &response) {
            Ok(ScrapeOutcome::Accepted(links)) => {
                for link in &links {
                    self.frontier.add_url(link);
                }
                tracing::debug!(url = %url, links = links.len(), "page accepted");
                self.frontier.mark_url_complete(url);
            }
            Ok(ScrapeOutcome::Rejected(reason)) => {
                tracing::debug!(url = %url, reason = ?reason, "page rejected");
                self.frontier.mark_url_complete(url);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "bad response, url left pending");
            }
        }
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_extraction() {
        assert_eq!(host_of("https://WWW.ICS.uci.edu/a/"), "www.ics.uci.edu");
        assert_eq!(host_of("not a url"), "unknown");
    }
}
