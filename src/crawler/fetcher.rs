use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("invalid cache server address: {0}")]
    InvalidCacheServer(String),
}

/// Result of an HTTP fetch: status, final URL after redirects, raw body
/// bytes, and a lowercase-keyed header map.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub url: String,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }
}

/// The seam between the crawl core and the network. Workers, the robots
/// cache, and tests all fetch through this trait.
pub trait Download: Send + Sync {
    fn download(&self, url: &str) -> Result<Response, FetchError>;
}

/// Blocking HTTP downloader. Requests optionally route through an
/// upstream caching proxy (`cache_server`).
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(
        user_agent: &str,
        timeout_secs: u64,
        cache_server: Option<&str>,
    ) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .pool_max_idle_per_host(20);

        if let Some(proxy_url) = cache_server {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::InvalidCacheServer(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        Ok(HttpDownloader {
            client: builder.build()?,
        })
    }
}

impl Download for HttpDownloader {
    fn download(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.client.get(url).send()?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers().iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = response.bytes()?.to_vec();

        Ok(Response {
            status,
            url: final_url,
            body,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        let response = Response {
            status: 200,
            url: "https://ics.uci.edu/".to_string(),
            body: Vec::new(),
            headers,
        };
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_invalid_cache_server_rejected() {
        let result = HttpDownloader::new("TestAgent/1.0", 5, Some("not a proxy url"));
        assert!(matches!(result, Err(FetchError::InvalidCacheServer(_))));
    }
}
