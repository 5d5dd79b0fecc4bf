//! A polite, multi-threaded web crawler for a closed family of academic
//! sites. Workers pull URLs from a crash-safe SQLite frontier, observe
//! per-host politeness, filter out traps and duplicate content, and feed
//! crawl-wide statistics that are reported on shutdown.

pub mod config;
pub mod crawler;
pub mod report;
pub mod stopwords;

pub use config::Config;
pub use crawler::Crawler;
pub use report::Report;
