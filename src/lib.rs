//! Sumi-Sweep: a polite, resumable site crawler
//!
//! This crate implements a single-process crawl engine that walks a site under
//! depth, count and domain bounds while honoring robots.txt, sitemaps and
//! crawl-delay. The engine is built from small injected services:
//!
//! - [`frontier`] holds pending work and enforces exactly-once admission
//! - [`robots`] and [`sitemap`] provide compliance data per domain
//! - [`state`] owns per-domain rate limiting and circuit breaking
//! - [`crawler`] runs the bounded worker pool against a pluggable fetcher
//! - [`storage`] persists checkpoints for resume
//! - [`output`] aggregates results and renders summaries

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod output;
pub mod robots;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Sweep operations
///
/// Only configuration problems, an unusable start URL and checkpoint loading
/// surface here. Per-page failures never abort a crawl; they are recorded in
/// the [`output::CrawlResult`] instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Invalid start URL '{url}': {reason}")]
    InvalidStartUrl { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] storage::CheckpointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CoordinatorBuilder, ShutdownHandle};
pub use frontier::{DedupKey, FrontierEntry, TraversalStrategy};
pub use output::{CrawlResult, CrawlSummary};
pub use state::{CircuitState, DomainState};
pub use url::{extract_domain, normalize_url};
