//! Robots.txt compliance cache
//!
//! One entry per (domain, user agent), refreshed once per TTL window. A
//! robots.txt that cannot be fetched is cached as a negative entry for the
//! retry cooldown, resolved to allow-all or deny-all by the failure policy.
//! Concurrent lookups for the same key share a single fetch.

use crate::config::{Config, RobotsFailurePolicy};
use crate::crawler::{FetchErrorKind, Fetcher};
use crate::robots::ParsedRobots;
use crate::state::Clock;
use crate::url::{extract_domain, robots_url};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    domain: String,
    user_agent: String,
}

/// Cached robots.txt data for a domain
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub robots: Arc<ParsedRobots>,
    pub fetched_at: Instant,
    pub expires_at: Instant,
    /// True when the fetch failed and the failure policy was applied
    pub negative: bool,
}

impl CachedRobots {
    pub fn is_stale(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Timing and failure settings for [`RobotsCache`]
#[derive(Debug, Clone)]
pub struct RobotsSettings {
    pub ttl: Duration,
    pub failure_cooldown: Duration,
    pub failure_policy: RobotsFailurePolicy,
    pub timeout: Duration,
}

impl RobotsSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.politeness.robots_ttl(),
            failure_cooldown: config.politeness.robots_retry_cooldown(),
            failure_policy: config.politeness.robots_failure_policy,
            timeout: config.retry.timeout(),
        }
    }
}

impl Default for RobotsSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Injected robots service shared by all workers of one engine
pub struct RobotsCache {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    settings: RobotsSettings,
    entries: Mutex<HashMap<CacheKey, CachedRobots>>,
    fetch_locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RobotsCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, settings: RobotsSettings) -> Self {
        Self {
            fetcher,
            clock,
            settings,
            entries: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key(url: &Url, user_agent: &str) -> Option<CacheKey> {
        Some(CacheKey {
            domain: extract_domain(url)?,
            user_agent: user_agent.to_lowercase(),
        })
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedRobots> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| !entry.is_stale(self.clock.now()))
            .cloned()
    }

    fn fetch_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fetch_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Returns the robots rules governing `url`, fetching them if needed
    pub async fn get(&self, url: &Url, user_agent: &str) -> Arc<ParsedRobots> {
        let Some(key) = Self::key(url, user_agent) else {
            return Arc::new(ParsedRobots::allow_all());
        };
        if let Some(entry) = self.cached(&key) {
            return entry.robots;
        }

        let lock = self.fetch_lock(&key);
        let _guard = lock.lock().await;
        // Another task may have refreshed the entry while we waited
        if let Some(entry) = self.cached(&key) {
            return entry.robots;
        }

        let entry = self.fetch(url, &key.domain).await;
        let robots = entry.robots.clone();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
        robots
    }

    async fn fetch(&self, url: &Url, domain: &str) -> CachedRobots {
        let now = self.clock.now();
        let positive = |robots: ParsedRobots| CachedRobots {
            robots: Arc::new(robots),
            fetched_at: now,
            expires_at: now + self.settings.ttl,
            negative: false,
        };

        let Some(location) = robots_url(url) else {
            return positive(ParsedRobots::allow_all());
        };

        match self.fetcher.fetch(&location, self.settings.timeout).await {
            Ok(response) => {
                tracing::debug!("Fetched robots.txt for {}", domain);
                positive(ParsedRobots::from_content(&response.body))
            }
            // No robots.txt (or not readable to us) means no restrictions
            Err(e) if e.kind == FetchErrorKind::HttpClientError => {
                tracing::debug!("No robots.txt for {} ({})", domain, e);
                positive(ParsedRobots::allow_all())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch robots.txt for {}: {} (applying '{:?}' policy for {:?})",
                    domain,
                    e,
                    self.settings.failure_policy,
                    self.settings.failure_cooldown
                );
                let robots = match self.settings.failure_policy {
                    RobotsFailurePolicy::Allow => ParsedRobots::allow_all(),
                    RobotsFailurePolicy::Deny => ParsedRobots::deny_all(),
                };
                CachedRobots {
                    robots: Arc::new(robots),
                    fetched_at: now,
                    expires_at: now + self.settings.failure_cooldown,
                    negative: true,
                }
            }
        }
    }

    /// Checks whether `user_agent` may fetch `url`
    ///
    /// Fetches robots.txt on a cache miss; concurrent callers for the same
    /// domain wait for that one fetch.
    ///
    /// # Arguments
    ///
    /// * `url` - The page about to be fetched
    /// * `user_agent` - The robots.txt product token
    ///
    /// # Returns
    ///
    /// * `true` - If robots.txt (or the failure policy) allows the fetch
    /// * `false` - If it is disallowed
    pub async fn permits(&self, url: &Url, user_agent: &str) -> bool {
        self.get(url, user_agent).await.is_allowed(url.as_str(), user_agent)
    }

    /// Crawl-delay from the cached rules for `domain`, without fetching
    pub fn crawl_delay(&self, domain: &str, user_agent: &str) -> Option<Duration> {
        let key = CacheKey {
            domain: domain.to_lowercase(),
            user_agent: user_agent.to_lowercase(),
        };
        self.cached(&key)?.robots.crawl_delay(user_agent)
    }

    /// `Sitemap:` URLs listed in the robots.txt of `site`
    pub async fn sitemaps(&self, site: &Url, user_agent: &str) -> Vec<Url> {
        self.get(site, user_agent).await.sitemaps().to_vec()
    }

    /// Number of cached entries, fresh or stale
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RobotsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotsCache")
            .field("settings", &self.settings)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{FakeResponse, FakeSite};
    use crate::state::SystemClock;

    const UA: &str = "SumiSweep";

    fn settings(policy: RobotsFailurePolicy) -> RobotsSettings {
        RobotsSettings {
            ttl: Duration::from_secs(3600),
            failure_cooldown: Duration::from_secs(60),
            failure_policy: policy,
            timeout: Duration::from_secs(5),
        }
    }

    fn cache(site: Arc<FakeSite>, policy: RobotsFailurePolicy) -> RobotsCache {
        RobotsCache::new(site, Arc::new(SystemClock), settings(policy))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rules_fetched_once_per_ttl() {
        let site = Arc::new(
            FakeSite::new().robots("https://a.test", "User-agent: *\nDisallow: /admin\nCrawl-delay: 2"),
        );
        let cache = cache(site.clone(), RobotsFailurePolicy::Allow);

        assert!(cache.permits(&url("https://a.test/page"), UA).await);
        assert!(!cache.permits(&url("https://a.test/admin/page"), UA).await);
        assert_eq!(
            cache.crawl_delay("a.test", UA),
            Some(Duration::from_secs(2))
        );
        assert_eq!(site.request_count("https://a.test/robots.txt"), 1);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(cache.crawl_delay("a.test", UA), None);
        assert!(cache.permits(&url("https://a.test/page"), UA).await);
        assert_eq!(site.request_count("https://a.test/robots.txt"), 2);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_everything() {
        let site = Arc::new(FakeSite::new());
        let cache = cache(site, RobotsFailurePolicy::Deny);
        assert!(cache.permits(&url("https://a.test/anything"), UA).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_uses_policy_and_negative_cache() {
        let site = Arc::new(FakeSite::new().respond(
            "https://a.test/robots.txt",
            FakeResponse::Error(FetchErrorKind::ConnectionFailure),
        ));

        let deny = cache(site.clone(), RobotsFailurePolicy::Deny);
        assert!(!deny.permits(&url("https://a.test/page"), UA).await);
        assert!(!deny.permits(&url("https://a.test/other"), UA).await);
        assert_eq!(site.request_count("https://a.test/robots.txt"), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!deny.permits(&url("https://a.test/page"), UA).await);
        assert_eq!(site.request_count("https://a.test/robots.txt"), 2);

        let allow = cache(site, RobotsFailurePolicy::Allow);
        assert!(allow.permits(&url("https://a.test/page"), UA).await);
    }

    #[tokio::test]
    async fn test_keyed_by_domain_and_agent() {
        let site = Arc::new(
            FakeSite::new()
                .robots("https://a.test", "User-agent: OtherBot\nDisallow: /")
                .robots("https://b.test", "User-agent: *\nDisallow: /"),
        );
        let cache = cache(site.clone(), RobotsFailurePolicy::Allow);

        assert!(cache.permits(&url("https://a.test/x"), UA).await);
        assert!(!cache.permits(&url("https://a.test/x"), "OtherBot").await);
        assert!(!cache.permits(&url("https://b.test/x"), UA).await);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let site = Arc::new(
            FakeSite::new()
                .with_latency(Duration::from_millis(20))
                .robots("https://a.test", "User-agent: *\nAllow: /"),
        );
        let cache = Arc::new(cache(site.clone(), RobotsFailurePolicy::Allow));

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .permits(&url(&format!("https://a.test/{}", i)), UA)
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(site.request_count("https://a.test/robots.txt"), 1);
    }

    #[tokio::test]
    async fn test_sitemaps() {
        let site = Arc::new(FakeSite::new().robots(
            "https://a.test",
            "Sitemap: https://a.test/sitemap_a.xml\nUser-agent: *\nDisallow:",
        ));
        let cache = cache(site, RobotsFailurePolicy::Allow);
        let sitemaps = cache.sitemaps(&url("https://a.test/"), UA).await;
        assert_eq!(sitemaps, vec![url("https://a.test/sitemap_a.xml")]);
    }
}
