//! Sitemap discovery
//!
//! Finds a site's sitemaps (robots.txt `Sitemap:` lines first, then a set of
//! well-known paths) and flattens them into page entries. Sitemap indexes are
//! followed up to [`MAX_INDEX_DEPTH`] levels with a visited set guarding
//! against cycles. A sitemap that fails to fetch or parse is logged and
//! skipped; discovery continues with the others.
//!
//! Entry metadata only orders seeds. Every seed still passes the frontier's
//! depth, count and domain checks.

use crate::crawler::Fetcher;
use crate::robots::RobotsCache;
use crate::url::{normalize_parsed, site_root};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use sitemap::structs::ChangeFreq;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Paths probed when robots.txt lists no sitemap
pub const WELL_KNOWN_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemaps.xml",
    "/sitemap/sitemap.xml",
];

/// Nesting limit for sitemap indexes
pub const MAX_INDEX_DEPTH: u32 = 3;

/// Priority assumed for entries that carry none
const DEFAULT_PRIORITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    fn from_sitemap(freq: &ChangeFreq) -> Option<Self> {
        match freq {
            ChangeFreq::Always => Some(Self::Always),
            ChangeFreq::Hourly => Some(Self::Hourly),
            ChangeFreq::Daily => Some(Self::Daily),
            ChangeFreq::Weekly => Some(Self::Weekly),
            ChangeFreq::Monthly => Some(Self::Monthly),
            ChangeFreq::Yearly => Some(Self::Yearly),
            ChangeFreq::Never => Some(Self::Never),
            ChangeFreq::None | ChangeFreq::ParseErr(_) => None,
        }
    }
}

/// A page listed in a sitemap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub url: Url,
    pub last_modified: Option<DateTime<Utc>>,
    pub change_frequency: Option<ChangeFrequency>,
    pub priority: Option<f32>,
}

impl SitemapEntry {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            last_modified: None,
            change_frequency: None,
            priority: None,
        }
    }

    fn effective_priority(&self) -> f32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

/// Orders entries by priority (highest first), then most recently modified
pub fn sort_entries(entries: &mut [SitemapEntry]) {
    entries.sort_by(|a, b| {
        b.effective_priority()
            .partial_cmp(&a.effective_priority())
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.last_modified.cmp(&a.last_modified))
    });
}

#[derive(Debug, Default)]
struct ParsedSitemap {
    urls: Vec<SitemapEntry>,
    children: Vec<Url>,
    errors: usize,
}

/// Reads one sitemap or sitemap index document
fn read_sitemap(body: &str) -> ParsedSitemap {
    let mut parsed = ParsedSitemap::default();
    for entity in SiteMapReader::new(Cursor::new(body.as_bytes())) {
        match entity {
            SiteMapEntity::Url(entry) => {
                let Some(url) = entry.loc.get_url().and_then(|u| reparse(&u.to_string())) else {
                    parsed.errors += 1;
                    continue;
                };
                parsed.urls.push(SitemapEntry {
                    url,
                    last_modified: entry
                        .lastmod
                        .get_time()
                        .and_then(|t| to_utc(&t.to_rfc3339())),
                    change_frequency: ChangeFrequency::from_sitemap(&entry.changefreq),
                    priority: entry.priority.get_priority(),
                });
            }
            SiteMapEntity::SiteMap(entry) => {
                match entry.loc.get_url().and_then(|u| reparse(&u.to_string())) {
                    Some(url) => parsed.children.push(url),
                    None => parsed.errors += 1,
                }
            }
            SiteMapEntity::Err(e) => {
                tracing::debug!("Sitemap parse error: {:?}", e);
                parsed.errors += 1;
            }
        }
    }
    parsed
}

fn reparse(url: &str) -> Option<Url> {
    Url::parse(url).ok()
}

fn to_utc(rfc3339: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Sitemap Discoverer, sharing the engine's fetcher and robots cache
pub struct SitemapDiscoverer {
    fetcher: Arc<dyn Fetcher>,
    robots: Arc<RobotsCache>,
    user_agent: String,
    timeout: Duration,
}

impl SitemapDiscoverer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        robots: Arc<RobotsCache>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            robots,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// Finds sitemap URLs for the site of `base_url`
    ///
    /// Sitemaps declared in robots.txt are returned as-is. Only when there
    /// are none are the well-known paths probed, keeping those that answer.
    pub async fn discover(&self, base_url: &Url) -> Vec<Url> {
        let declared = self.robots.sitemaps(base_url, &self.user_agent).await;
        if !declared.is_empty() {
            tracing::debug!("robots.txt declares {} sitemap(s)", declared.len());
            return declared;
        }

        let root = site_root(base_url);
        let mut found = Vec::new();
        for path in WELL_KNOWN_PATHS {
            let Ok(candidate) = root.join(path) else {
                continue;
            };
            match self.fetcher.fetch(&candidate, self.timeout).await {
                Ok(_) => {
                    tracing::debug!("Found sitemap at {}", candidate);
                    found.push(candidate);
                }
                Err(e) => tracing::trace!("No sitemap at {}: {}", candidate, e),
            }
        }
        found
    }

    /// Flattens a sitemap (or index) into deduplicated page entries
    pub async fn parse(&self, sitemap_url: &Url) -> Vec<SitemapEntry> {
        let mut entries = Vec::new();
        let mut seen_pages = HashSet::new();
        let mut visited = HashSet::new();
        self.collect(sitemap_url, &mut visited, &mut seen_pages, &mut entries)
            .await;
        entries
    }

    async fn collect(
        &self,
        sitemap_url: &Url,
        visited: &mut HashSet<Url>,
        seen_pages: &mut HashSet<Url>,
        entries: &mut Vec<SitemapEntry>,
    ) {
        let mut pending = vec![(sitemap_url.clone(), 0u32)];

        while let Some((url, depth)) = pending.pop() {
            if !visited.insert(url.clone()) {
                continue;
            }

            let body = match self.fetcher.fetch(&url, self.timeout).await {
                Ok(response) => response.body,
                Err(e) => {
                    tracing::warn!("Skipping sitemap {}: {}", url, e);
                    continue;
                }
            };

            let parsed = read_sitemap(&body);
            if parsed.errors > 0 {
                tracing::warn!("Sitemap {} had {} unreadable entries", url, parsed.errors);
            }

            for entry in parsed.urls {
                let key = normalize_parsed(entry.url.clone()).unwrap_or_else(|_| entry.url.clone());
                if seen_pages.insert(key) {
                    entries.push(entry);
                }
            }

            if depth >= MAX_INDEX_DEPTH {
                if !parsed.children.is_empty() {
                    tracing::debug!("Sitemap index nesting limit reached at {}", url);
                }
                continue;
            }
            // Reverse so children are read in document order
            for child in parsed.children.into_iter().rev() {
                pending.push((child, depth + 1));
            }
        }
    }

    /// Discovers, parses and orders every sitemap entry for the site
    ///
    /// # Arguments
    ///
    /// * `base_url` - Any URL on the site; only its origin is used
    ///
    /// # Returns
    ///
    /// Deduplicated entries, highest priority first. Unreachable or
    /// malformed sitemaps contribute nothing.
    pub async fn seed_entries(&self, base_url: &Url) -> Vec<SitemapEntry> {
        let mut entries = Vec::new();
        let mut seen_pages = HashSet::new();
        let mut visited = HashSet::new();

        for sitemap in self.discover(base_url).await {
            self.collect(&sitemap, &mut visited, &mut seen_pages, &mut entries)
                .await;
        }

        sort_entries(&mut entries);
        tracing::info!("Sitemaps listed {} URL(s) for {}", entries.len(), base_url);
        entries
    }
}

impl std::fmt::Debug for SitemapDiscoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SitemapDiscoverer")
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}
