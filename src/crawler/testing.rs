//! In-memory site for engine tests
//!
//! `FakeSite` implements [`Fetcher`] from a table of canned responses and
//! records the (virtual) instant of every request, so rate-limit and
//! ordering properties can be asserted without a network.

use crate::crawler::{FetchError, FetchErrorKind, FetchResponse, Fetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Clone)]
pub enum FakeResponse {
    Html(String),
    Text(String),
    Status(u16),
    Error(FetchErrorKind),
    /// Never answers; the caller's timeout or cancellation must end it
    Hang,
}

#[derive(Debug, Default)]
struct Routes {
    /// Responses served in order; the last one repeats
    responses: HashMap<String, Vec<FakeResponse>>,
    served: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct FakeSite {
    routes: Mutex<Routes>,
    requests: Mutex<Vec<(Url, Instant)>>,
    latency: Duration,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serves an HTML page linking to each of `links`
    pub fn page(self, url: &str, links: &[&str]) -> Self {
        let anchors: String = links
            .iter()
            .map(|href| format!("<a href=\"{}\">{}</a>", href, href))
            .collect();
        self.respond(url, FakeResponse::Html(format!("<html><body>{}</body></html>", anchors)))
    }

    pub fn robots(self, site: &str, content: &str) -> Self {
        let url = format!("{}/robots.txt", site.trim_end_matches('/'));
        self.respond(&url, FakeResponse::Text(content.to_string()))
    }

    pub fn respond(self, url: &str, response: FakeResponse) -> Self {
        self.sequence(url, vec![response])
    }

    pub fn sequence(self, url: &str, responses: Vec<FakeResponse>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .responses
            .insert(url.to_string(), responses);
        self
    }

    /// Every request made so far, in order
    pub fn requests(&self) -> Vec<(Url, Instant)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u.as_str() == url)
            .count()
    }

    /// Paths fetched, excluding robots.txt and sitemaps
    pub fn page_paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|(u, _)| u.path().to_string())
            .filter(|p| p != "/robots.txt" && !p.contains("sitemap"))
            .collect()
    }

    fn next_response(&self, url: &Url) -> FakeResponse {
        let mut routes = self.routes.lock().unwrap();
        let Some(responses) = routes.responses.get(url.as_str()).cloned() else {
            return FakeResponse::Status(404);
        };
        let served = routes.served.entry(url.to_string()).or_insert(0);
        let index = (*served).min(responses.len().saturating_sub(1));
        *served += 1;
        responses
            .get(index)
            .cloned()
            .unwrap_or(FakeResponse::Status(404))
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        self.requests.lock().unwrap().push((url.clone(), started));
        let response = self.next_response(url);

        if matches!(response, FakeResponse::Hang) || self.latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(FetchError::timeout(timeout));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (content_type, body) = match response {
            FakeResponse::Html(body) => ("text/html", body),
            FakeResponse::Text(body) => ("text/plain", body),
            FakeResponse::Status(status) if status >= 400 => {
                return Err(FetchError::from_status(status))
            }
            FakeResponse::Status(_) => ("text/html", String::new()),
            FakeResponse::Error(kind) => return Err(FetchError::new(kind, "simulated")),
            FakeResponse::Hang => unreachable!("handled above"),
        };

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Ok(FetchResponse {
            status: 200,
            headers,
            body,
            elapsed: started.elapsed(),
            final_url: url.clone(),
        })
    }
}
