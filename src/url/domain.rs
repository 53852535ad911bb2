use url::Url;

/// Extracts the domain key from a URL
///
/// The key is the lowercase host, followed by `:port` when the URL uses a
/// non-default port. Per-domain politeness state and robots rules are keyed
/// by this value, so two services on one host but different ports are
/// treated as separate sites.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_sweep::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Extracts only the lowercase host, ignoring any port
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the site root (`scheme://authority/`) for a URL
pub fn site_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}
