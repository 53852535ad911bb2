//! HTTP fetcher implementation
//!
//! This module defines the fetch collaborator used by workers and the robots
//! and sitemap services:
//! - The `Fetcher` trait, so tests can substitute an in-memory site
//! - `HttpFetcher`, the reqwest-backed default
//! - Error classification into the kinds the retry policy understands

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Maximum redirect hops followed per request
pub const MAX_REDIRECTS: usize = 10;

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Timeout,
    ConnectionFailure,
    TlsFailure,
    /// 4xx response
    HttpClientError,
    /// 5xx response
    HttpServerError,
}

impl FetchErrorKind {
    /// Whether another attempt may succeed; 4xx responses are final
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::HttpClientError)
    }

    /// Whether the failure says something about the host's health
    ///
    /// A 4xx is a well-formed answer from a healthy server, so it does not
    /// count toward the circuit breaker.
    pub fn counts_against_domain(&self) -> bool {
        !matches!(self, Self::HttpClientError)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailure => "connection failure",
            Self::TlsFailure => "TLS failure",
            Self::HttpClientError => "HTTP client error",
            Self::HttpServerError => "HTTP server error",
        };
        f.write_str(s)
    }
}

/// A failed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Status code for HTTP errors
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Builds the error for a 4xx or 5xx status
    pub fn from_status(status: u16) -> Self {
        let kind = if status >= 500 {
            FetchErrorKind::HttpServerError
        } else {
            FetchErrorKind::HttpClientError
        };
        Self {
            kind,
            message: format!("HTTP {}", status),
            status: Some(status),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FetchErrorKind::Timeout,
            format!("timed out after {:.1}s", after.as_secs_f64()),
        )
    }

    /// Failure reason recorded in the crawl result
    pub fn reason(&self) -> String {
        match self.status {
            Some(_) => self.message.clone(),
            None => format!("{}: {}", self.kind, self.message),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

impl std::error::Error for FetchError {}

/// A successful (2xx/3xx) response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
    /// URL after redirects; links resolve against it
    pub final_url: Url,
}

impl FetchResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// True when the body should go to the link extractor
    ///
    /// A missing content type is treated as HTML.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => true,
        }
    }
}

/// Fetch collaborator
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    ///
    /// 4xx and 5xx statuses are returned as errors with their status set.
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_sweep::config::UserAgentConfig;
/// use sumi_sweep::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetcher on top of reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(FetchError::from_status(status));
        }

        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify_error)?;

        Ok(FetchResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            final_url,
        })
    }
}

/// Maps a reqwest error onto a fetch error kind
fn classify_error(error: reqwest::Error) -> FetchError {
    let message = error.to_string();
    if error.is_timeout() {
        return FetchError::new(FetchErrorKind::Timeout, message);
    }
    if let Some(status) = error.status() {
        return FetchError::from_status(status.as_u16());
    }
    if error.is_redirect() {
        return FetchError::new(FetchErrorKind::HttpClientError, message);
    }
    if looks_like_tls(&error) {
        return FetchError::new(FetchErrorKind::TlsFailure, message);
    }
    FetchError::new(FetchErrorKind::ConnectionFailure, message)
}

/// reqwest has no TLS predicate; walk the source chain for tell-tale text
fn looks_like_tls(error: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = source {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config();
        let client = build_http_client(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            FetchError::from_status(404).kind,
            FetchErrorKind::HttpClientError
        );
        assert_eq!(
            FetchError::from_status(503).kind,
            FetchErrorKind::HttpServerError
        );
        assert!(!FetchErrorKind::HttpClientError.is_retryable());
        assert!(FetchErrorKind::HttpServerError.is_retryable());
        assert!(FetchErrorKind::Timeout.is_retryable());
        assert_eq!(FetchError::from_status(404).reason(), "HTTP 404");
    }

    #[test]
    fn test_is_html() {
        let mut response = FetchResponse {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
            elapsed: Duration::ZERO,
            final_url: Url::parse("https://a.test/").unwrap(),
        };
        assert!(response.is_html());

        response
            .headers
            .insert("content-type".into(), "text/HTML; charset=utf-8".into());
        assert!(response.is_html());

        response
            .headers
            .insert("content-type".into(), "application/pdf".into());
        assert!(!response.is_html());
    }

    #[tokio::test]
    async fn test_http_fetcher_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/ok", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
        let base = Url::parse(&server.uri()).unwrap();
        let timeout = Duration::from_secs(5);

        let ok = fetcher.fetch(&base.join("/moved").unwrap(), timeout).await.unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(ok.final_url.path(), "/ok");
        assert!(ok.is_html());

        let broken = fetcher
            .fetch(&base.join("/broken").unwrap(), timeout)
            .await
            .unwrap_err();
        assert_eq!(broken.kind, FetchErrorKind::HttpServerError);
        assert_eq!(broken.status, Some(502));

        let missing = fetcher
            .fetch(&base.join("/missing").unwrap(), timeout)
            .await
            .unwrap_err();
        assert_eq!(missing.kind, FetchErrorKind::HttpClientError);
    }

    #[tokio::test]
    async fn test_http_fetcher_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher
            .fetch(&url, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = fetcher.fetch(&url, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::ConnectionFailure);
    }
}
