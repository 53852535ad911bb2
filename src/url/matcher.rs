/// Checks if a host matches a domain pattern
///
/// Patterns come in two forms:
/// 1. `"example.com"` matches `example.com` and any of its subdomains
/// 2. `"*.example.com"` is the explicit wildcard form and matches the same set
///
/// Matching is done on label boundaries, so `example.com` never matches
/// `notexample.com`. Both inputs are expected to be lowercase.
///
/// # Examples
///
/// ```
/// use sumi_sweep::url::matches_domain;
///
/// assert!(matches_domain("example.com", "example.com"));
/// assert!(matches_domain("example.com", "blog.example.com"));
/// assert!(matches_domain("*.example.com", "api.v2.example.com"));
/// assert!(!matches_domain("example.com", "notexample.com"));
/// ```
pub fn matches_domain(pattern: &str, candidate: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    if base.is_empty() || candidate.is_empty() {
        return false;
    }
    candidate == base
        || (candidate.len() > base.len()
            && candidate.ends_with(base)
            && candidate.as_bytes()[candidate.len() - base.len() - 1] == b'.')
}

/// Set of domains links are allowed to point at
#[derive(Debug, Clone, Default)]
pub struct DomainAllowList {
    patterns: Vec<String>,
}

impl DomainAllowList {
    /// Builds an allow-list from configured patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Returns true if no pattern was configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Checks a host (without port) against every pattern
    pub fn permits(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.patterns.iter().any(|p| matches_domain(p, &host))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
