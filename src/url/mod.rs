//! URL handling module for Sumi-Sweep
//!
//! This module provides URL normalization (the deduplication key), domain
//! extraction, allow-list matching, and the filter for resources that are
//! never worth fetching.

mod domain;
mod matcher;
mod normalize;

use url::Url;

pub use domain::{extract_domain, extract_host, site_root};
pub use matcher::{matches_domain, DomainAllowList};
pub use normalize::{normalize_parsed, normalize_url};

/// File extensions skipped at admission
pub const SKIPPED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".pdf", ".zip", ".exe", ".dmg", ".mp3", ".mp4", ".avi",
    ".mov",
];

/// Checks whether a URL points at a binary or media resource
///
/// Only the last path segment is inspected, case-insensitively.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_sweep::url::has_skipped_extension;
///
/// assert!(has_skipped_extension(&Url::parse("https://example.com/a/photo.JPG").unwrap()));
/// assert!(!has_skipped_extension(&Url::parse("https://example.com/jpg/page").unwrap()));
/// ```
pub fn has_skipped_extension(url: &Url) -> bool {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_ascii_lowercase();

    SKIPPED_EXTENSIONS
        .iter()
        .any(|ext| last_segment.ends_with(ext))
}

/// Location of the robots.txt file governing a URL
pub fn robots_url(url: &Url) -> Option<Url> {
    site_root(url).join("/robots.txt").ok()
}
