//! HTML link extraction
//!
//! This module turns a fetched page into candidate links:
//! - `ExtractionRules` map field names to a CSS selector and attribute
//! - `HtmlLinkExtractor` applies them with scraper
//! - Relative links resolve against `<base href>` or the page URL
//!
//! **Excluded:** `javascript:`, `mailto:`, `tel:` and `data:` links,
//! fragment-only links, and anchors with a `download` attribute.
//! `rel="nofollow"` links are followed; the `rel` value is passed on as
//! metadata.

use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Selector and attribute that yield a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    pub selector: String,
    pub attribute: String,
}

/// Field name to extraction rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRules {
    rules: BTreeMap<String, ExtractionRule>,
}

impl ExtractionRules {
    /// An empty rule set
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Adds or replaces the rule for `field`
    pub fn with_rule(
        mut self,
        field: impl Into<String>,
        selector: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        self.rules.insert(
            field.into(),
            ExtractionRule {
                selector: selector.into(),
                attribute: attribute.into(),
            },
        );
        self
    }

    pub fn get(&self, field: &str) -> Option<&ExtractionRule> {
        self.rules.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtractionRule)> {
        self.rules.iter()
    }
}

impl Default for ExtractionRules {
    /// `links` from `<a href>` and `canonical` from `<link rel="canonical">`
    fn default() -> Self {
        Self::empty()
            .with_rule("links", "a[href]", "href")
            .with_rule("canonical", "link[rel='canonical'][href]", "href")
    }
}

/// What the extractor knows about a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMetadata {
    /// Field name of the rule that produced the link
    pub rule: String,
    /// Visible text, whitespace collapsed
    pub text: Option<String>,
    pub rel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Absolute http(s) URL, not yet normalized
    pub url: Url,
    pub metadata: LinkMetadata,
}

/// Extraction collaborator
pub trait LinkExtractor: Send + Sync {
    /// Returns every candidate link in `body`, in document order per rule
    fn extract(&self, body: &str, base_url: &Url) -> Vec<ExtractedLink>;
}

#[derive(Debug)]
struct CompiledRule {
    field: String,
    selector: Selector,
    attribute: String,
}

/// Default extractor built on scraper
#[derive(Debug)]
pub struct HtmlLinkExtractor {
    rules: Vec<CompiledRule>,
    base: Option<Selector>,
}

impl HtmlLinkExtractor {
    /// Compiles the rule selectors
    ///
    /// # Returns
    ///
    /// * `Ok(HtmlLinkExtractor)` - All selectors compiled
    /// * `Err(ConfigError)` - A selector is invalid
    pub fn new(rules: &ExtractionRules) -> Result<Self, ConfigError> {
        let compiled = rules
            .iter()
            .map(|(field, rule)| {
                let selector = Selector::parse(&rule.selector).map_err(|e| {
                    ConfigError::Validation(format!(
                        "Invalid selector '{}' for field '{}': {:?}",
                        rule.selector, field, e
                    ))
                })?;
                Ok(CompiledRule {
                    field: field.clone(),
                    selector,
                    attribute: rule.attribute.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            rules: compiled,
            base: Selector::parse("base[href]").ok(),
        })
    }

    /// Resolution base: the first `<base href>` if present, else the page URL
    fn document_base(&self, document: &Html, page_url: &Url) -> Url {
        self.base
            .as_ref()
            .and_then(|selector| document.select(selector).next())
            .and_then(|base| base.value().attr("href"))
            .and_then(|href| page_url.join(href.trim()).ok())
            .unwrap_or_else(|| page_url.clone())
    }
}

impl Default for HtmlLinkExtractor {
    fn default() -> Self {
        Self::new(&ExtractionRules::default()).unwrap_or(Self {
            rules: Vec::new(),
            base: None,
        })
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract(&self, body: &str, base_url: &Url) -> Vec<ExtractedLink> {
        let document = Html::parse_document(body);
        let base = self.document_base(&document, base_url);

        let mut links = Vec::new();
        for rule in &self.rules {
            for element in document.select(&rule.selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                let Some(href) = element.value().attr(&rule.attribute) else {
                    continue;
                };
                if let Some(url) = resolve_link(href, &base) {
                    links.push(ExtractedLink {
                        url,
                        metadata: metadata_for(&rule.field, element),
                    });
                }
            }
        }
        links
    }
}

fn metadata_for(field: &str, element: ElementRef<'_>) -> LinkMetadata {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    LinkMetadata {
        rule: field.to_string(),
        text: Some(text).filter(|t| !t.is_empty()),
        rel: element.value().attr("rel").map(str::to_string),
    }
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}
