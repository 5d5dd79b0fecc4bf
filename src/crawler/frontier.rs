use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::Connection;
use thiserror::Error;

use crate::config::Config;

use super::urls;

/// How often `get_tbd_url` logs running frontier statistics.
const STATS_LOG_INTERVAL: u64 = 100;

#[derive(Error, Debug)]
pub enum FrontierError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not remove existing store {path}: {source}")]
    RemoveStore {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Snapshot of frontier progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierStats {
    pub total: u64,
    pub completed: u64,
    pub in_queue: usize,
    pub pending: u64,
}

struct FrontierInner {
    queue: VecDeque<String>,
    pops: u64,
}

/// Durable record of every URL the crawler has discovered, plus an
/// in-memory queue of the ones still to be downloaded.
///
/// The store survives restarts: URLs whose processing never finished
/// stay at `completed = 0` and are re-queued on the next run. Each
/// database operation opens a fresh connection; the single frontier lock
/// serializes writes and queue emission so an insert and its enqueue are
/// atomic with respect to other workers.
pub struct Frontier {
    db_path: PathBuf,
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    pub fn new(config: &Config, restart: bool) -> Result<Self, FrontierError> {
        let db_path = PathBuf::from(format!("{}.db", config.save_file));

        if db_path.exists() {
            if restart {
                tracing::info!(path = %db_path.display(), "found save file, deleting it");
                std::fs::remove_file(&db_path).map_err(|source| FrontierError::RemoveStore {
                    path: db_path.clone(),
                    source,
                })?;
            }
        } else if !restart {
            tracing::info!(path = %db_path.display(), "no save file found, starting from seed");
        }

        let frontier = Frontier {
            db_path,
            inner: Mutex::new(FrontierInner {
                queue: VecDeque::new(),
                pops: 0,
            }),
        };
        frontier.init_store()?;

        if restart || frontier.total_count()? == 0 {
            for seed in &config.seed_urls {
                frontier.add_url(seed);
            }
        } else {
            frontier.load_pending()?;
        }

        Ok(frontier)
    }

    fn connection(&self) -> Result<Connection, rusqlite::Error> {
        Connection::open(&self.db_path)
    }

    fn init_store(&self) -> Result<(), FrontierError> {
        let conn = self.connection()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS urls (
                urlhash TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(())
    }

    /// Re-queue every unfinished URL that still passes validation.
    fn load_pending(&self) -> Result<(), FrontierError> {
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        let conn = self.connection()?;

        let mut statement = conn.prepare("SELECT url FROM urls WHERE completed = 0")?;
        let pending = statement.query_map([], |row| row.get::<_, String>(0))?;

        let mut queued = 0u64;
        for url in pending {
            let url = url?;
            if urls::is_valid(&url) {
                inner.queue.push_back(url);
                queued += 1;
            }
        }

        let total: u64 =
            conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get::<_, i64>(0))? as u64;
        tracing::info!(
            queued,
            total,
            "found {queued} urls to be downloaded from {total} total urls discovered"
        );
        Ok(())
    }

    fn total_count(&self) -> Result<u64, FrontierError> {
        let conn = self.connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get::<_, i64>(0))? as u64)
    }

    /// Record a discovered URL. The canonical form is inserted at most
    /// once over the lifetime of the store; only a genuinely new row is
    /// pushed onto the download queue. Database errors are logged and
    /// leave the queue untouched; the URL can be rediscovered later.
    pub fn add_url(&self, url: &str) {
        let Some(canonical) = urls::normalize(url) else {
            tracing::warn!(url = %url, "dropping unparseable url");
            return;
        };
        let urlhash = urls::url_hash(&canonical);

        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        match self.insert_new(&urlhash, &canonical) {
            Ok(true) => inner.queue.push_back(canonical),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(url = %canonical, error = %e, "database error adding url");
            }
        }
    }

    fn insert_new(&self, urlhash: &str, url: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.connection()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO urls (urlhash, url, completed) VALUES (?1, ?2, 0)",
            (urlhash, url),
        )?;
        Ok(inserted > 0)
    }

    /// Non-blocking pop of the next URL to download; `None` when the
    /// queue is currently empty.
    pub fn get_tbd_url(&self) -> Option<String> {
        let (url, pops) = {
            let mut inner = self.inner.lock().expect("frontier lock poisoned");
            match inner.queue.pop_front() {
                Some(url) => {
                    inner.pops += 1;
                    (url, inner.pops)
                }
                None => {
                    drop(inner);
                    match self.stats() {
                        Ok(stats) => tracing::debug!(
                            total = stats.total,
                            completed = stats.completed,
                            "frontier empty"
                        ),
                        Err(e) => tracing::warn!(error = %e, "frontier stats unavailable"),
                    }
                    return None;
                }
            }
        };

        if pops % STATS_LOG_INTERVAL == 0 {
            if let Ok(stats) = self.stats() {
                tracing::info!(
                    total = stats.total,
                    completed = stats.completed,
                    in_queue = stats.in_queue,
                    pending = stats.pending,
                    "frontier progress"
                );
            }
        }
        Some(url)
    }

    /// Mark a URL as fully processed. A hash that was never recorded is
    /// logged as an error but does not fail the caller.
    pub fn mark_url_complete(&self, url: &str) {
        let urlhash = urls::url_hash(url);
        let _inner = self.inner.lock().expect("frontier lock poisoned");

        match self.update_completed(&urlhash) {
            Ok(0) => {
                tracing::error!(url = %url, "completed url was never recorded");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(url = %url, error = %e, "database error marking url complete");
            }
        }
    }

    fn update_completed(&self, urlhash: &str) -> Result<usize, rusqlite::Error> {
        let conn = self.connection()?;
        conn.execute("UPDATE urls SET completed = 1 WHERE urlhash = ?1", [urlhash])
    }

    pub fn stats(&self) -> Result<FrontierStats, FrontierError> {
        let in_queue = self.inner.lock().expect("frontier lock poisoned").queue.len();
        let conn = self.connection()?;
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get::<_, i64>(0))? as u64;
        let completed: u64 = conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE completed = 1",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;
        Ok(FrontierStats {
            total,
            completed,
            in_queue,
            pending: total - completed,
        })
    }

    /// Emit the closing statistics block. Safe to call from the shutdown
    /// path even when the store is unreadable.
    pub fn log_final_stats(&self) {
        let stats = match self.stats() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "could not read final frontier stats");
                return;
            }
        };
        tracing::info!("FRONTIER FINAL STATISTICS");
        tracing::info!("Total URLs discovered: {}", stats.total);
        tracing::info!("URLs completed: {}", stats.completed);
        tracing::info!("URLs remaining in queue: {}", stats.in_queue);
        tracing::info!("URLs pending (not completed): {}", stats.pending);
    }

    #[cfg(test)]
    pub(crate) fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }
}
