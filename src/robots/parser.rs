//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate. Crawl-delay
//! and Sitemap lines are not covered by it and are read here directly.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Matcher decides from `content`
    Rules,
    AllowAll,
    DenyAll,
}

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    mode: Mode,
    sitemaps: Vec<Url>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt body
    ///
    /// # Returns
    ///
    /// Rules for permission checks, with any `Sitemap:` lines collected
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            mode: Mode::Rules,
            sitemaps: parse_sitemaps(content),
        }
    }

    /// Permits everything; used for a missing robots.txt
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::AllowAll,
            sitemaps: Vec::new(),
        }
    }

    /// Permits nothing; used when an unreachable robots.txt is treated as deny
    pub fn deny_all() -> Self {
        Self {
            content: String::new(),
            mode: Mode::DenyAll,
            sitemaps: Vec::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `user_agent` - The robots.txt product token (e.g. "SumiSweep")
    ///
    /// # Returns
    ///
    /// * `true` - If the URL may be fetched
    /// * `false` - If a matching rule disallows it
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.mode {
            Mode::AllowAll => true,
            Mode::DenyAll => false,
            Mode::Rules if self.content.trim().is_empty() => true,
            Mode::Rules => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Agent tokens match
    /// case-insensitively.
    ///
    /// # Returns
    ///
    /// * `Some(Duration)` - The delay between requests
    /// * `None` - If no applicable group sets one
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.mode != Mode::Rules {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut for_agent = None;
        let mut for_wildcard = None;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    if !in_agent_lines {
                        group.clear();
                    }
                    group.push(value.to_lowercase());
                    in_agent_lines = true;
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    let Some(delay) = parse_delay(value) else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        for_agent.get_or_insert(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        for_wildcard.get_or_insert(delay);
                    }
                }
                _ => in_agent_lines = false,
            }
        }

        for_agent.or(for_wildcard)
    }

    /// `Sitemap:` URLs listed in the file
    pub fn sitemaps(&self) -> &[Url] {
        &self.sitemaps
    }
}

/// Lowercased key and trimmed value of every directive line
fn directives(content: &str) -> impl Iterator<Item = (String, &str)> {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim()))
    })
}

fn parse_delay(value: &str) -> Option<Duration> {
    let secs = value.parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn parse_sitemaps(content: &str) -> Vec<Url> {
    let mut sitemaps: Vec<Url> = Vec::new();
    for (key, value) in directives(content) {
        if key != "sitemap" {
            continue;
        }
        match Url::parse(value) {
            Ok(url) if !sitemaps.contains(&url) => sitemaps.push(url),
            Ok(_) => {}
            Err(e) => tracing::debug!("Ignoring sitemap line '{}': {}", value, e),
        }
    }
    sitemaps
}
