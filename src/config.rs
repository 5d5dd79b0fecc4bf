use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Crawl configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// URLs the crawl starts from (and reseeds from after a restart).
    pub seed_urls: Vec<String>,
    /// Path prefix for the durable frontier store; the store itself
    /// lives at `<save_file>.db`.
    pub save_file: String,
    #[serde(default = "default_threads_count")]
    pub threads_count: usize,
    /// Minimum spacing between fetches to the same host, in seconds.
    #[serde(default = "default_time_delay")]
    pub time_delay: f64,
    /// Optional upstream caching proxy; passed verbatim to the
    /// downloader.
    #[serde(default)]
    pub cache_server: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional stopword list (one word per line); the embedded default
    /// list is used when unset.
    #[serde(default)]
    pub stopwords_file: Option<PathBuf>,
}

fn default_threads_count() -> usize {
    1
}

fn default_time_delay() -> f64 {
    0.5
}

fn default_user_agent() -> String {
    "ICSCrawler/1.0".to_string()
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_urls.is_empty() {
            return Err(ConfigError::InvalidValue(
                "seed_urls",
                "must list at least one URL",
            ));
        }
        if self.threads_count == 0 {
            return Err(ConfigError::InvalidValue(
                "threads_count",
                "must be at least 1",
            ));
        }
        if !self.time_delay.is_finite() || self.time_delay < 0.0 {
            return Err(ConfigError::InvalidValue(
                "time_delay",
                "must be a nonnegative number of seconds",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_config_parses() {
        let file = write_config(
            r#"
seed_urls = ["https://ics.uci.edu/", "https://cs.uci.edu/"]
save_file = "frontier_state"
threads_count = 8
time_delay = 0.75
cache_server = "http://cache.local:9000"
user_agent = "ResearchCrawler/2.0"
"#,
        );
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.seed_urls.len(), 2);
        assert_eq!(config.save_file, "frontier_state");
        assert_eq!(config.threads_count, 8);
        assert_eq!(config.time_delay, 0.75);
        assert_eq!(config.cache_server.as_deref(), Some("http://cache.local:9000"));
        assert_eq!(config.user_agent, "ResearchCrawler/2.0");
        assert!(config.stopwords_file.is_none());
    }

    #[test]
    fn test_defaults_apply() {
        let file = write_config(
            r#"
seed_urls = ["https://ics.uci.edu/"]
save_file = "frontier_state"
"#,
        );
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.threads_count, 1);
        assert_eq!(config.time_delay, 0.5);
        assert!(config.cache_server.is_none());
        assert_eq!(config.user_agent, "ICSCrawler/1.0");
    }

    #[test]
    fn test_empty_seeds_rejected() {
        let file = write_config("seed_urls = []\nsave_file = \"x\"\n");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::InvalidValue("seed_urls", _))
        ));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let file = write_config(
            "seed_urls = [\"https://ics.uci.edu/\"]\nsave_file = \"x\"\nthreads_count = 0\n",
        );
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::InvalidValue("threads_count", _))
        ));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let file = write_config(
            "seed_urls = [\"https://ics.uci.edu/\"]\nsave_file = \"x\"\ntime_delay = -1.0\n",
        );
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::InvalidValue("time_delay", _))
        ));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let file = write_config("seed_urls = [not toml");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
