use url::Url;

/// Returns true if two hosts belong to the same site
///
/// A leading `www.` is ignored on either side, so that a root URL that
/// redirects to its `www.` twin does not leave the crawl with zero links.
pub fn same_site(a: &str, b: &str) -> bool {
    strip_www(a).eq_ignore_ascii_case(strip_www(b))
}

/// Returns true if `url` lives on the same site as `root`
pub fn is_same_site(url: &Url, root: &Url) -> bool {
    match (url.host_str(), root.host_str()) {
        (Some(a), Some(b)) => same_site(a, b),
        _ => false,
    }
}

/// Serializes the origin of a URL (`scheme://host[:port]`)
///
/// Site-wide findings are keyed by this value when matching dismissals.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
