//! Crawl coordinator - wires the engine together for one run
//!
//! The coordinator owns the injected collaborators (fetcher, link extractor,
//! clock, URL filter, checkpoint store) and, for each crawl:
//! - validates and seeds the start URL (plus sitemap seeds when enabled)
//! - builds the frontier, domain registry and robots cache
//! - runs the worker scheduler until the frontier drains or a stop is requested
//! - writes a final checkpoint and returns the aggregated result
//!
//! `resume` rebuilds the same services from a checkpoint instead of a seed.

use crate::config::Config;
use crate::crawler::checkpointer::Checkpointer;
use crate::crawler::scheduler::{Scheduler, SchedulerSettings};
use crate::crawler::shutdown::{stopped, ShutdownHandle, StopSignal};
use crate::crawler::worker::WorkerContext;
use crate::crawler::{Fetcher, HtmlLinkExtractor, HttpFetcher, LinkExtractor};
use crate::frontier::{AdmissionRules, Frontier, FrontierEntry, PushOutcome, UrlFilter};
use crate::output::{CrawlResult, CrawlSummary, ResultAggregator};
use crate::robots::{RobotsCache, RobotsSettings};
use crate::sitemap::SitemapDiscoverer;
use crate::state::{AdmissionPolicy, Clock, DomainRegistry, RetryPolicy, SystemClock};
use crate::storage::{open_store, Checkpoint, CheckpointStore};
use crate::url::{extract_host, site_root, DomainAllowList};
use crate::{Result, SweepError};
use std::sync::Arc;
use url::Url;

/// Builder for [`Coordinator`]
///
/// Every collaborator has a production default; tests and embedders swap
/// them out.
pub struct CoordinatorBuilder {
    config: Config,
    fetcher: Option<Arc<dyn Fetcher>>,
    extractor: Option<Arc<dyn LinkExtractor>>,
    clock: Option<Arc<dyn Clock>>,
    url_filter: Option<UrlFilter>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config_hash: Option<String>,
}

impl CoordinatorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
            extractor: None,
            clock: None,
            url_filter: None,
            checkpoint_store: None,
            config_hash: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn LinkExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Extra admission predicate; URLs it rejects are dropped silently
    pub fn url_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Url) -> bool + Send + Sync + 'static,
    {
        self.url_filter = Some(Arc::new(filter));
        self
    }

    /// Overrides the store selected by `[checkpoint]`
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Hash of the configuration file, recorded in checkpoints
    pub fn config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Validates the configuration and fills in default collaborators
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to crawl
    /// * `Err(SweepError)` - Invalid configuration, HTTP client or checkpoint store
    pub fn build(self) -> Result<Coordinator> {
        crate::config::validate(&self.config)?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.config.user_agent)?),
        };
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(HtmlLinkExtractor::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let checkpoint_store = match self.checkpoint_store {
            Some(store) => Some(store),
            None if self.config.checkpoint.enabled => Some(open_store(&self.config.checkpoint)?),
            None => None,
        };

        Ok(Coordinator {
            config: Arc::new(self.config),
            fetcher,
            extractor,
            clock,
            url_filter: self.url_filter,
            checkpoint_store,
            config_hash: self.config_hash,
            shutdown: ShutdownHandle::new(),
        })
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn LinkExtractor>,
    clock: Arc<dyn Clock>,
    url_filter: Option<UrlFilter>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config_hash: Option<String>,
    shutdown: ShutdownHandle,
}

/// Services built for one run
struct Run {
    start_url: String,
    frontier: Arc<Frontier>,
    registry: Arc<DomainRegistry>,
    robots: Arc<RobotsCache>,
}

impl Coordinator {
    /// Coordinator with every default collaborator
    pub fn new(config: Config) -> Result<Self> {
        CoordinatorBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for stopping the current (or next) crawl from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn checkpoint_store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.checkpoint_store.as_ref()
    }

    /// Latest checkpoint from the configured store, if any
    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        match &self.checkpoint_store {
            Some(store) => Ok(store.load()?),
            None => Ok(None),
        }
    }

    /// Crawls from `start_url`
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - The crawl ran to completion or was stopped;
    ///   per-page failures are inside the result
    /// * `Err(SweepError::InvalidStartUrl)` - The start URL is unusable
    pub async fn crawl(&self, start_url: &str) -> Result<CrawlResult> {
        let seed = FrontierEntry::seed(start_url).map_err(|e| SweepError::InvalidStartUrl {
            url: start_url.to_string(),
            reason: e.to_string(),
        })?;
        let seed_url = seed.url().clone();
        self.shutdown.reset();

        let results = Arc::new(ResultAggregator::new(
            seed_url.as_str(),
            self.clock.wall_now(),
        ));
        let frontier = Arc::new(Frontier::new(
            self.config.crawler.strategy,
            self.admission_rules(&seed_url),
            results,
        ));
        let run = self.services(seed_url.to_string(), frontier);

        match run.frontier.push(seed.clone()) {
            PushOutcome::Admitted => {}
            rejected => {
                tracing::warn!("Start URL {} was not admitted ({:?})", seed_url, rejected)
            }
        }
        if self.config.crawler.use_sitemap {
            tokio::select! {
                _ = self.seed_from_sitemaps(&run, &seed) => {}
                _ = stopped(self.shutdown.subscribe(), StopSignal::Abort) => {
                    tracing::info!("Sitemap seeding cancelled");
                }
            }
        }

        tracing::info!(
            "Starting {} crawl of {} (max depth {}, max urls {})",
            self.config.crawler.strategy,
            seed_url,
            limit_label(self.config.crawler.max_depth),
            limit_label(self.config.crawler.max_urls)
        );
        Ok(self.execute(run).await)
    }

    /// Continues a crawl from a checkpoint
    ///
    /// Dedup membership, pending work, domain states and earlier results are
    /// restored, so nothing already admitted is admitted again.
    pub async fn resume(&self, checkpoint: Checkpoint) -> Result<CrawlResult> {
        let seed_url =
            Url::parse(&checkpoint.start_url).map_err(|e| SweepError::InvalidStartUrl {
                url: checkpoint.start_url.clone(),
                reason: e.to_string(),
            })?;
        self.shutdown.reset();

        if let (Some(saved), Some(current)) = (&checkpoint.config_hash, &self.config_hash) {
            if saved != current {
                tracing::warn!("Configuration changed since the checkpoint was taken");
            }
        }

        let results = Arc::new(ResultAggregator::new(
            checkpoint.start_url.clone(),
            self.clock.wall_now(),
        ));
        if let Some(snapshot) = &checkpoint.results {
            results.restore(snapshot);
        }
        let pending = checkpoint.frontier_snapshot.len();
        let frontier = Arc::new(Frontier::restore(
            self.config.crawler.strategy,
            self.admission_rules(&seed_url),
            checkpoint.frontier_snapshot,
            checkpoint.dedup_snapshot,
            results,
        ));
        let run = self.services(checkpoint.start_url, frontier);
        run.registry.restore(&checkpoint.domain_states_snapshot);

        tracing::info!(
            "Resuming crawl of {} from checkpoint taken at {} ({} pending)",
            run.start_url,
            checkpoint.taken_at,
            pending
        );
        Ok(self.execute(run).await)
    }

    fn admission_rules(&self, seed: &Url) -> AdmissionRules {
        let crawler = &self.config.crawler;
        let allowed_domains = if crawler.allowed_domains.is_empty() {
            DomainAllowList::new(extract_host(seed))
        } else {
            DomainAllowList::new(crawler.allowed_domains.iter())
        };
        AdmissionRules {
            max_depth: crawler.max_depth_limit(),
            max_urls: crawler.max_urls_limit(),
            allowed_domains,
            url_filter: self.url_filter.clone(),
        }
    }

    fn services(&self, start_url: String, frontier: Arc<Frontier>) -> Run {
        let registry = Arc::new(DomainRegistry::new(
            AdmissionPolicy::from_config(&self.config),
            Arc::clone(&self.clock),
        ));
        let robots = Arc::new(RobotsCache::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.clock),
            RobotsSettings::from_config(&self.config),
        ));
        Run {
            start_url,
            frontier,
            registry,
            robots,
        }
    }

    async fn seed_from_sitemaps(&self, run: &Run, seed: &FrontierEntry) {
        let discoverer = SitemapDiscoverer::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&run.robots),
            self.config.user_agent.crawler_name.clone(),
            self.config.retry.timeout(),
        );
        let entries = discoverer.seed_entries(&site_root(seed.url())).await;
        let candidates: Vec<FrontierEntry> = entries
            .into_iter()
            .filter_map(|entry| FrontierEntry::sitemap(entry.url, seed).ok())
            .collect();
        let found = candidates.len();
        let admitted = run
            .frontier
            .push_all(candidates)
            .into_iter()
            .filter(|outcome| *outcome == PushOutcome::Admitted)
            .count();
        tracing::info!("Seeded {} of {} sitemap URLs", admitted, found);
    }

    async fn execute(&self, run: Run) -> CrawlResult {
        let checkpointer = self.checkpoint_store.as_ref().map(|store| {
            Arc::new(Checkpointer {
                store: Arc::clone(store),
                frontier: Arc::clone(&run.frontier),
                registry: Arc::clone(&run.registry),
                start_url: run.start_url.clone(),
                config_hash: self.config_hash.clone(),
            })
        });

        let ctx = Arc::new(WorkerContext {
            frontier: Arc::clone(&run.frontier),
            registry: Arc::clone(&run.registry),
            robots: Arc::clone(&run.robots),
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            retry: RetryPolicy::from_config(&self.config.retry),
            timeout: self.config.retry.timeout(),
            respect_robots: self.config.politeness.respect_robots,
            robots_agent: self.config.user_agent.crawler_name.clone(),
            stop: self.shutdown.subscribe(),
        });
        let crawler = &self.config.crawler;
        let settings = SchedulerSettings {
            workers: crawler.workers,
            health_check_interval: crawler.health_check_interval(),
            stall_timeout: crawler.stall_timeout(),
            checkpoint_interval: Some(self.config.checkpoint.interval())
                .filter(|interval| !interval.is_zero()),
        };

        Scheduler::new(ctx, settings, checkpointer.clone()).run().await;

        if let Some(checkpointer) = checkpointer {
            if checkpointer.save().await {
                tracing::info!(
                    "Checkpoint saved to {}",
                    checkpointer.store.location().display()
                );
            }
        }

        let result = run.frontier.results().finalize(self.clock.wall_now());
        match self.shutdown.signal() {
            StopSignal::Running => {}
            signal => tracing::info!("Crawl stopped early ({:?})", signal),
        }
        let summary = CrawlSummary::from_result(&result);
        tracing::info!(
            "Crawl finished: {} visited, {} failed, {} discovered in {:.1}s",
            summary.visited,
            summary.failed,
            summary.discovered,
            summary.duration_seconds
        );
        result
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("strategy", &self.config.crawler.strategy)
            .field("workers", &self.config.crawler.workers)
            .field("checkpoints", &self.checkpoint_store.is_some())
            .finish()
    }
}

fn limit_label(limit: i64) -> String {
    if limit < 0 {
        "unlimited".to_string()
    } else {
        limit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraversalStrategy;
    use crate::crawler::testing::{FakeResponse, FakeSite};
    use crate::crawler::ROBOTS_DISALLOWED;
    use crate::frontier::DOMAIN_NOT_ALLOWED;
    use crate::storage::JsonCheckpointStore;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.checkpoint.enabled = false;
        config.politeness.rate_limit = 0.0;
        config.politeness.max_per_domain = 4;
        config.crawler.workers = 3;
        config.circuit_breaker.failure_threshold = 10;
        config
    }

    async fn crawl(config: Config, site: &Arc<FakeSite>) -> CrawlResult {
        Coordinator::builder(config)
            .fetcher(site.clone())
            .build()
            .unwrap()
            .crawl("https://a.test/")
            .await
            .unwrap()
    }

    fn urls(paths: &[&str]) -> BTreeSet<String> {
        paths
            .iter()
            .map(|path| format!("https://a.test{}", path))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_ceiling() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/x", "/y"])
                .page("https://a.test/x", &["/z"])
                .page("https://a.test/y", &[])
                .page("https://a.test/z", &[]),
        );
        let mut config = test_config();
        config.crawler.max_depth = 1;

        let result = crawl(config, &site).await;

        assert_eq!(result.discovered_urls, urls(&["/", "/x", "/y"]));
        assert_eq!(result.visited_urls, urls(&["/", "/x", "/y"]));
        assert_eq!(result.max_depth_reached, 1);
        assert_eq!(site.request_count("https://a.test/z"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_robots_disallow_is_recorded_as_failed() {
        let site = Arc::new(
            FakeSite::new()
                .robots("https://a.test", "User-agent: *\nDisallow: /admin\n")
                .page("https://a.test/", &["/admin/page", "/ok"])
                .page("https://a.test/admin/page", &[])
                .page("https://a.test/ok", &[]),
        );

        let result = crawl(test_config(), &site).await;

        assert_eq!(
            result
                .failed_urls
                .get("https://a.test/admin/page")
                .map(String::as_str),
            Some(ROBOTS_DISALLOWED)
        );
        assert!(!result.visited_urls.contains("https://a.test/admin/page"));
        assert!(result.visited_urls.contains("https://a.test/ok"));
        assert_eq!(site.request_count("https://a.test/admin/page"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_self_links_fetched_once() {
        let site = Arc::new(
            FakeSite::new()
                .page(
                    "https://a.test/",
                    &["/", "/a", "/a", "/a#top", "/b?utm_source=feed", "/b/"],
                )
                .page("https://a.test/a", &["/", "/b", "/a"])
                .page("https://a.test/b", &["/a"]),
        );

        let result = crawl(test_config(), &site).await;

        assert_eq!(result.discovered_urls, urls(&["/", "/a", "/b"]));
        assert_eq!(result.visited_urls.len(), 3);
        for path in ["/", "/a", "/b"] {
            assert_eq!(site.request_count(&format!("https://a.test{}", path)), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_delay_spaces_requests_under_concurrency() {
        let site = Arc::new(
            FakeSite::new()
                .with_latency(Duration::from_millis(500))
                .robots("https://a.test", "User-agent: *\nCrawl-delay: 2\n")
                .page("https://a.test/", &["/p1", "/p2", "/p3", "/p4", "/p5"])
                .page("https://a.test/p1", &[])
                .page("https://a.test/p2", &[])
                .page("https://a.test/p3", &[])
                .page("https://a.test/p4", &[])
                .page("https://a.test/p5", &[]),
        );
        let mut config = test_config();
        config.crawler.workers = 4;
        config.politeness.max_per_domain = 3;

        let result = crawl(config, &site).await;
        assert_eq!(result.visited_urls.len(), 6);

        let mut starts: Vec<_> = site
            .requests()
            .into_iter()
            .filter(|(url, _)| url.path() != "/robots.txt")
            .map(|(_, at)| at)
            .collect();
        starts.sort();
        assert_eq!(starts.len(), 6);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bfs_fetches_in_level_order() {
        let site = Arc::new(
            FakeSite::new()
                .with_latency(Duration::from_millis(100))
                .page("https://a.test/", &["/a", "/b"])
                .page("https://a.test/a", &["/a1", "/a2"])
                .page("https://a.test/b", &["/b1"])
                .page("https://a.test/a1", &[])
                .page("https://a.test/a2", &[])
                .page("https://a.test/b1", &[]),
        );

        crawl(test_config(), &site).await;

        let order = site.page_paths();
        let position = |path: &str| order.iter().position(|p| p == path).unwrap();
        assert_eq!(order[0], "/");
        for shallow in ["/a", "/b"] {
            for deep in ["/a1", "/a2", "/b1"] {
                assert!(position(shallow) < position(deep));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dfs_variants_visit_same_set() {
        let site = || {
            Arc::new(
                FakeSite::new()
                    .page("https://a.test/", &["/a", "/b"])
                    .page("https://a.test/a", &["/a1"])
                    .page("https://a.test/b", &["/b1"])
                    .page("https://a.test/a1", &[])
                    .page("https://a.test/b1", &[]),
            )
        };

        let mut config = test_config();
        config.crawler.workers = 1;

        config.crawler.strategy = TraversalStrategy::Dfs;
        let dfs_site = site();
        let dfs = crawl(config.clone(), &dfs_site).await;

        config.crawler.strategy = TraversalStrategy::DfsPreorder;
        let preorder_site = site();
        let preorder = crawl(config, &preorder_site).await;

        assert_eq!(dfs.visited_urls, preorder.visited_urls);
        assert_eq!(dfs.visited_urls.len(), 5);
        assert_eq!(dfs_site.page_paths(), vec!["/", "/b", "/b1", "/a", "/a1"]);
        assert_eq!(
            preorder_site.page_paths(),
            vec!["/", "/a", "/a1", "/b", "/b1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_count_ceiling() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/1", "/2", "/3", "/4", "/5"])
                .page("https://a.test/1", &[])
                .page("https://a.test/2", &[])
                .page("https://a.test/3", &[])
                .page("https://a.test/4", &[])
                .page("https://a.test/5", &[]),
        );
        let mut config = test_config();
        config.crawler.max_urls = 3;

        let result = crawl(config, &site).await;

        assert_eq!(result.discovered_urls.len(), 3);
        assert!(result.visited_urls.len() + result.failed_urls.len() <= 3);
        assert_eq!(site.page_paths().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_records_failure() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/flaky", "/dead", "/missing"])
                .sequence(
                    "https://a.test/flaky",
                    vec![
                        FakeResponse::Status(503),
                        FakeResponse::Error(crate::crawler::FetchErrorKind::Timeout),
                        FakeResponse::Html("<p>ok</p>".to_string()),
                    ],
                )
                .respond("https://a.test/dead", FakeResponse::Status(503)),
        );
        let mut config = test_config();
        config.retry.max_retries = 2;

        let result = crawl(config, &site).await;

        assert!(result.visited_urls.contains("https://a.test/flaky"));
        assert!(!result.failed_urls.contains_key("https://a.test/flaky"));
        assert_eq!(site.request_count("https://a.test/flaky"), 3);

        assert_eq!(
            result.failed_urls.get("https://a.test/dead").map(String::as_str),
            Some("HTTP 503")
        );
        assert_eq!(site.request_count("https://a.test/dead"), 3);

        // Client errors are not retried
        assert_eq!(
            result
                .failed_urls
                .get("https://a.test/missing")
                .map(String::as_str),
            Some("HTTP 404")
        );
        assert_eq!(site.request_count("https://a.test/missing"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sitemap_urls_seed_at_depth_one() {
        let sitemap = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.test/listed</loc><priority>0.9</priority></url>
  <url><loc>https://other.test/elsewhere</loc></url>
</urlset>"#;
        let site = Arc::new(
            FakeSite::new()
                .robots("https://a.test", "Sitemap: https://a.test/sitemap.xml\n")
                .respond(
                    "https://a.test/sitemap.xml",
                    FakeResponse::Text(sitemap.to_string()),
                )
                .page("https://a.test/", &[])
                .page("https://a.test/listed", &[]),
        );
        let mut config = test_config();
        config.crawler.use_sitemap = true;
        config.crawler.max_depth = 1;

        let result = crawl(config, &site).await;

        assert_eq!(result.visited_urls, urls(&["/", "/listed"]));
        assert_eq!(site.request_count("https://other.test/elsewhere"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_does_not_revisit() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonCheckpointStore::new(dir.path().join("cp.json")));

        let first_site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/a", "/slow"])
                .page("https://a.test/a", &[])
                .respond("https://a.test/slow", FakeResponse::Hang),
        );
        let coordinator = Coordinator::builder(test_config())
            .fetcher(first_site.clone())
            .checkpoint_store(store.clone())
            .build()
            .unwrap();
        let shutdown = coordinator.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.abort();
        });
        let partial = coordinator.crawl("https://a.test/").await.unwrap();
        assert_eq!(partial.visited_urls, urls(&["/", "/a"]));
        assert!(partial.failed_urls.is_empty());

        let checkpoint = store.load().unwrap().unwrap();
        assert_eq!(checkpoint.frontier_snapshot.len(), 1);

        let second_site = Arc::new(
            FakeSite::new()
                .page("https://a.test/slow", &["/", "/a", "/new"])
                .page("https://a.test/new", &[]),
        );
        let resumed = Coordinator::builder(test_config())
            .fetcher(second_site.clone())
            .build()
            .unwrap()
            .resume(checkpoint)
            .await
            .unwrap();

        assert_eq!(resumed.visited_urls, urls(&["/", "/a", "/slow", "/new"]));
        assert_eq!(second_site.page_paths(), vec!["/slow", "/new"]);
    }

    #[tokio::test]
    async fn test_invalid_start_url_is_fatal() {
        let site = Arc::new(FakeSite::new());
        let coordinator = Coordinator::builder(test_config())
            .fetcher(site)
            .build()
            .unwrap();

        let result = coordinator.crawl("not a url").await;
        assert!(matches!(result, Err(SweepError::InvalidStartUrl { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_filter_drops_links() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/keep", "/private/x"])
                .page("https://a.test/keep", &[]),
        );
        let result = Coordinator::builder(test_config())
            .fetcher(site.clone())
            .url_filter(|url: &Url| !url.path().starts_with("/private"))
            .build()
            .unwrap()
            .crawl("https://a.test/")
            .await
            .unwrap();

        assert_eq!(result.discovered_urls, urls(&["/", "/keep"]));
        assert!(result.failed_urls.is_empty());
    }

    /// Crawls with an abort requested after `after`; returns the result and
    /// how long the crawl kept running once the abort was sent
    async fn crawl_aborted(
        config: Config,
        site: &Arc<FakeSite>,
        after: Duration,
    ) -> (CrawlResult, Duration) {
        let coordinator = Coordinator::builder(config)
            .fetcher(site.clone())
            .build()
            .unwrap();
        let shutdown = coordinator.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            shutdown.abort();
        });
        let started = Instant::now();
        let result = coordinator.crawl("https://a.test/").await.unwrap();
        (result, started.elapsed().saturating_sub(after))
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_robots_lookup() {
        let site = Arc::new(
            FakeSite::new()
                .respond("https://a.test/robots.txt", FakeResponse::Hang)
                .page("https://a.test/", &[]),
        );
        let mut config = test_config();
        config.retry.timeout = 3600.0;
        config.crawler.stall_timeout = 3600;

        let (result, lingered) = crawl_aborted(config, &site, Duration::from_secs(10)).await;

        assert!(lingered < Duration::from_secs(1), "crawl ran {:?} past abort", lingered);
        assert!(result.visited_urls.is_empty());
        assert!(result.failed_urls.is_empty());
        assert_eq!(site.request_count("https://a.test/"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_sitemap_seeding() {
        let site = Arc::new(
            FakeSite::new()
                .robots("https://a.test", "Sitemap: https://a.test/sitemap.xml\n")
                .respond("https://a.test/sitemap.xml", FakeResponse::Hang)
                .page("https://a.test/", &[]),
        );
        let mut config = test_config();
        config.crawler.use_sitemap = true;
        config.retry.timeout = 3600.0;

        let (result, lingered) = crawl_aborted(config, &site, Duration::from_secs(10)).await;

        assert!(lingered < Duration::from_secs(1), "crawl ran {:?} past abort", lingered);
        assert_eq!(result.discovered_urls, urls(&["/"]));
        assert!(result.visited_urls.is_empty());
        assert_eq!(site.request_count("https://a.test/"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_site_links_recorded_as_failed() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["https://b.test/x", "/local"])
                .page("https://a.test/local", &["https://b.test/x"])
                .page("https://b.test/x", &[]),
        );

        let result = crawl(test_config(), &site).await;

        assert_eq!(result.visited_urls, urls(&["/", "/local"]));
        assert_eq!(
            result.failed_urls.get("https://b.test/x").map(String::as_str),
            Some(DOMAIN_NOT_ALLOWED)
        );
        assert!(result.discovered_urls.contains("https://b.test/x"));
        assert_eq!(site.request_count("https://b.test/x"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_outside_allow_list_is_reported() {
        let site = Arc::new(FakeSite::new().page("https://a.test/", &[]));
        let mut config = test_config();
        config.crawler.allowed_domains = vec!["c.test".to_string()];

        let result = crawl(config, &site).await;

        assert!(result.visited_urls.is_empty());
        assert_eq!(
            result.failed_urls.get("https://a.test/").map(String::as_str),
            Some(DOMAIN_NOT_ALLOWED)
        );
        assert!(site.page_paths().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_defers_until_cooldown() {
        let site = Arc::new(
            FakeSite::new()
                .page("https://a.test/", &["/1", "/2", "/3", "/4", "/5"])
                .respond("https://a.test/1", FakeResponse::Status(503))
                .respond("https://a.test/2", FakeResponse::Status(503))
                .respond("https://a.test/3", FakeResponse::Status(503))
                .page("https://a.test/4", &[])
                .page("https://a.test/5", &[]),
        );
        let mut config = test_config();
        config.crawler.workers = 1;
        config.retry.max_retries = 0;
        config.circuit_breaker.failure_threshold = 3;
        config.circuit_breaker.cooldown = 60.0;

        let started = Instant::now();
        let result = crawl(config, &site).await;

        for path in ["/1", "/2", "/3"] {
            assert_eq!(
                result
                    .failed_urls
                    .get(&format!("https://a.test{}", path))
                    .map(String::as_str),
                Some("HTTP 503")
            );
        }
        // Deferred while open, not failed, then fetched once after the cooldown
        assert!(result.visited_urls.contains("https://a.test/4"));
        assert!(result.visited_urls.contains("https://a.test/5"));
        for path in ["/4", "/5"] {
            let url = format!("https://a.test{}", path);
            assert_eq!(site.request_count(&url), 1);
            let (_, at) = site
                .requests()
                .into_iter()
                .find(|(u, _)| u.as_str() == url)
                .unwrap();
            assert!(at - started >= Duration::from_secs(60));
        }
    }
}
