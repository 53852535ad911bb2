use crate::url::{normalize_parsed, normalize_url};
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How an entry entered the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Seed,
    Link,
    Sitemap,
}

/// Normalized URL identifying one logical resource
///
/// Two addresses that normalize to the same URL share a key, so admitting a
/// key once admits every spelling of that resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(Url);

impl DedupKey {
    /// Normalizes a URL string into its key
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        normalize_url(url).map(Self)
    }

    /// Normalizes an already parsed URL into its key
    pub fn from_url(url: Url) -> Result<Self, UrlError> {
        normalize_parsed(url).map(Self)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// A unit of pending work
///
/// Entries are immutable once created; the URL is always in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierEntry {
    url: Url,
    depth: u32,
    #[serde(default)]
    parent: Option<Url>,
    source: DiscoverySource,
}

impl FrontierEntry {
    /// The start URL of a crawl, at depth 0
    pub fn seed(url: &str) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_url(url)?,
            depth: 0,
            parent: None,
            source: DiscoverySource::Seed,
        })
    }

    /// A link found on `parent`, one level deeper
    pub fn link(url: Url, parent: &FrontierEntry) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_parsed(url)?,
            depth: parent.depth.saturating_add(1),
            parent: Some(parent.url.clone()),
            source: DiscoverySource::Link,
        })
    }

    /// A URL listed in a sitemap of the seed's site, at depth 1
    pub fn sitemap(url: Url, seed: &FrontierEntry) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_parsed(url)?,
            depth: seed.depth.saturating_add(1),
            parent: Some(seed.url.clone()),
            source: DiscoverySource::Sitemap,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<&Url> {
        self.parent.as_ref()
    }

    pub fn source(&self) -> DiscoverySource {
        self.source
    }

    pub fn key(&self) -> DedupKey {
        DedupKey(self.url.clone())
    }

    /// Whether the entry points back at the page it was found on
    pub fn is_self_link(&self) -> bool {
        self.parent.as_ref() == Some(&self.url)
    }
}
