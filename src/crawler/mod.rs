pub mod dedup;
pub mod fetcher;
pub mod frontier;
pub mod politeness;
pub mod robots;
pub mod scrape;
pub mod traps;
pub mod urls;
pub mod worker;

pub use fetcher::{Download, HttpDownloader, Response};
pub use frontier::Frontier;
pub use scrape::Scraper;

use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::report::Report;
use crate::stopwords;

use dedup::DedupCache;
use fetcher::FetchError;
use frontier::FrontierError;
use politeness::Politeness;
use robots::RobotsCache;
use traps::TrapDetector;
use worker::Worker;

/// Per-request timeout for page and robots fetches.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("frontier startup failed: {0}")]
    Frontier(#[from] FrontierError),
    #[error("http client setup failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not load stopwords: {0}")]
    Stopwords(#[from] std::io::Error),
}

/// One-shot emission of the final report and frontier statistics. Both
/// the normal join path and the signal handler funnel through here; the
/// `Once` guarantees the report is flushed exactly once per process.
pub struct Shutdown {
    flushed: Once,
    report: Arc<Report>,
    frontier: Arc<Frontier>,
}

impl Shutdown {
    fn new(report: Arc<Report>, frontier: Arc<Frontier>) -> Self {
        Shutdown {
            flushed: Once::new(),
            report,
            frontier,
        }
    }

    pub fn flush(&self) {
        self.flushed.call_once(|| {
            self.report.generate_report();
            self.frontier.log_final_stats();
        });
    }
}

/// Supervisor that wires the frontier, scraper pipeline, politeness
/// gate, and downloader together and drives `threads_count` workers to
/// completion.
pub struct Crawler {
    threads_count: usize,
    frontier: Arc<Frontier>,
    report: Arc<Report>,
    scraper: Arc<Scraper>,
    politeness: Arc<Politeness>,
    downloader: Arc<dyn Download>,
    shutdown: Arc<Shutdown>,
    workers: Vec<JoinHandle<()>>,
}

impl Crawler {
    /// Build a crawler over the real HTTP downloader.
    pub fn new(config: &Config, restart: bool) -> Result<Self, CrawlError> {
        let downloader = Arc::new(HttpDownloader::new(
            &config.user_agent,
            DOWNLOAD_TIMEOUT_SECS,
            config.cache_server.as_deref(),
        )?);
        Self::with_downloader(config, restart, downloader)
    }

    /// Build a crawler over any downloader. Tests inject canned ones.
    pub fn with_downloader(
        config: &Config,
        restart: bool,
        downloader: Arc<dyn Download>,
    ) -> Result<Self, CrawlError> {
        let stopwords = Arc::new(stopwords::load(config.stopwords_file.as_deref())?);
        let report = Arc::new(Report::new(stopwords.clone()));
        let scraper = Arc::new(Scraper::new(
            Arc::new(RobotsCache::new(downloader.clone())),
            Arc::new(DedupCache::new()),
            Arc::new(TrapDetector::new()),
            report.clone(),
            stopwords,
        ));
        let frontier = Arc::new(Frontier::new(config, restart)?);
        let politeness = Arc::new(Politeness::new(Duration::from_secs_f64(config.time_delay)));
        let shutdown = Arc::new(Shutdown::new(report.clone(), frontier.clone()));

        Ok(Crawler {
            threads_count: config.threads_count,
            frontier,
            report,
            scraper,
            politeness,
            downloader,
            shutdown,
            workers: Vec::new(),
        })
    }

    /// Route SIGINT/SIGTERM through the one-shot shutdown before the
    /// process exits. Workers are plain threads; they die with it, and
    /// anything not marked complete stays pending in the durable store.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.shutdown.clone();
        ctrlc::set_handler(move || {
            tracing::info!("received shutdown signal");
            shutdown.flush();
            std::process::exit(0);
        })
    }

    /// Start all workers without waiting for them.
    pub fn start(&mut self) {
        tracing::info!(workers = self.threads_count, "starting crawl");
        for id in 0..self.threads_count {
            let worker = Worker::new(
                id,
                self.frontier.clone(),
                self.scraper.clone(),
                self.politeness.clone(),
                self.downloader.clone(),
            );
            self.workers.push(worker.spawn());
        }
    }

    /// Wait for every worker to drain the frontier, then flush the
    /// final report.
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        self.shutdown.flush();
    }

    pub fn run(&mut self) {
        self.start();
        self.join();
    }

    pub fn report(&self) -> &Arc<Report> {
        &self.report
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }
}
