use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Sweep
///
/// Every section is optional in the TOML file; missing sections take the
/// defaults documented on each field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub politeness: PolitenessConfig,
    pub retry: RetryConfig,
    #[serde(rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub checkpoint: CheckpointConfig,
}

/// Frontier ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalStrategy {
    /// Level order: every depth-d entry is dequeued before any depth-d+1 entry
    #[default]
    Bfs,
    /// Stack order, links pushed in discovery order (last link visited first)
    Dfs,
    /// Stack order matching a recursive walk (first link visited first)
    DfsPreorder,
}

impl std::str::FromStr for TraversalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bfs" => Ok(Self::Bfs),
            "dfs" => Ok(Self::Dfs),
            "dfs-preorder" | "recursive" => Ok(Self::DfsPreorder),
            other => Err(format!(
                "unknown traversal strategy '{}' (expected bfs, dfs or dfs-preorder)",
                other
            )),
        }
    }
}

impl std::fmt::Display for TraversalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bfs => "bfs",
            Self::Dfs => "dfs",
            Self::DfsPreorder => "dfs-preorder",
        };
        f.write_str(name)
    }
}

/// Crawl bounds and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed (-1 = unlimited)
    pub max_depth: i64,

    /// Maximum number of URLs fetched or failed (-1 = unlimited)
    pub max_urls: i64,

    /// Traversal order of the frontier
    pub strategy: TraversalStrategy,

    /// Number of concurrent workers
    pub workers: usize,

    /// Seed the frontier from sitemaps as well as the start URL
    pub use_sitemap: bool,

    /// Domains links may point to (exact or `*.suffix`); empty = seed host only
    pub allowed_domains: Vec<String>,

    /// Seconds between worker health checks
    pub health_check_interval: u64,

    /// Seconds a single fetch may run before its worker is replaced
    pub stall_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_urls: -1,
            strategy: TraversalStrategy::Bfs,
            workers: 3,
            use_sitemap: false,
            allowed_domains: Vec::new(),
            health_check_interval: 30,
            stall_timeout: 300,
        }
    }
}

impl CrawlerConfig {
    /// Depth ceiling, `None` when unlimited
    pub fn max_depth_limit(&self) -> Option<u32> {
        u32::try_from(self.max_depth).ok()
    }

    /// URL count ceiling, `None` when unlimited
    pub fn max_urls_limit(&self) -> Option<usize> {
        usize::try_from(self.max_urls).ok()
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout)
    }
}

/// What to do when robots.txt cannot be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsFailurePolicy {
    #[default]
    Allow,
    Deny,
}

/// Per-domain politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum seconds between requests to one domain
    pub rate_limit: f64,

    /// Consult robots.txt before each fetch
    pub respect_robots: bool,

    /// Seconds a fetched robots.txt stays fresh
    pub robots_ttl: u64,

    /// Decision used while robots.txt is unavailable
    pub robots_failure_policy: RobotsFailurePolicy,

    /// Seconds a failed robots.txt fetch is remembered before retrying
    pub robots_retry_cooldown: u64,

    /// Concurrent in-flight fetches allowed per domain
    pub max_per_domain: usize,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            rate_limit: 0.5,
            respect_robots: true,
            robots_ttl: 24 * 60 * 60,
            robots_failure_policy: RobotsFailurePolicy::Allow,
            robots_retry_cooldown: 300,
            max_per_domain: 1,
        }
    }
}

impl PolitenessConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl)
    }

    pub fn robots_retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.robots_retry_cooldown)
    }
}

/// Retry and timeout configuration for fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,

    /// Backoff base in seconds
    pub base_delay: f64,

    /// Backoff ceiling in seconds
    pub max_delay: f64,

    /// Per-fetch timeout in seconds
    pub timeout: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 1.0,
            max_delay: 60.0,
            timeout: 30.0,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

/// Per-domain circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial request
    pub cooldown: f64,

    /// Upper bound in seconds for the escalated cooldown after failed trials
    pub max_cooldown: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: 60.0,
            max_cooldown: 600.0,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.max_cooldown)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiSweep".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Full `User-Agent` header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Where checkpoints are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Json,
    Sqlite,
}

/// Checkpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CheckpointConfig {
    pub enabled: bool,

    /// Checkpoint file (JSON document or SQLite database)
    pub path: PathBuf,

    /// Seconds between periodic checkpoints
    pub interval: u64,

    pub backend: CheckpointBackend,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./sweep-checkpoint.json"),
            interval: 60,
            backend: CheckpointBackend::Json,
        }
    }
}

impl CheckpointConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
