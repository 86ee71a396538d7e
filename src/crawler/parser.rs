//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Same-site links to follow (from <a> tags)
//! - Page title and meta description

use crate::url::{is_same_site, normalize_url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Content of `<meta name="description">`
    pub meta_description: Option<String>,

    /// Same-site links, normalized and deduplicated, in document order
    pub links: Vec<String>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` resolved against `<base href>` or `final_url`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Links to another site (host differs from `root` beyond a `www.` prefix)
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `root` - The audit's root URL (decides what is same-site)
/// * `final_url` - The post-redirect URL of the page
///
/// # Example
///
/// ```
/// use site_auditor::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page#top">Link</a></body></html>"#;
/// let root = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &root, &root);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, root: &Url, final_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        links: extract_links(&document, root, final_url),
    }
}

/// Extracts the page title from the HTML document
pub(crate) fn extract_title(document: &Html) -> Option<String> {
    static TITLE: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&TITLE, "title"))
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts the meta description from the HTML document
pub(crate) fn extract_meta_description(document: &Html) -> Option<String> {
    static META: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&META, "meta[name]"))
        .find(|element| {
            element
                .value()
                .attr("name")
                .is_some_and(|name| name.eq_ignore_ascii_case("description"))
        })
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts all same-site links from the HTML document
fn extract_links(document: &Html, root: &Url, final_url: &Url) -> Vec<String> {
    static ANCHOR: OnceLock<Selector> = OnceLock::new();
    static BASE: OnceLock<Selector> = OnceLock::new();

    // A <base href> overrides the document URL for relative links
    let base_url = document
        .select(selector(&BASE, "base[href]"))
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| final_url.join(href.trim()).ok())
        .unwrap_or_else(|| final_url.clone());

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector(&ANCHOR, "a[href]")) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve_link(href, &base_url) else {
            continue;
        };

        if !is_same_site(&absolute, root) {
            continue;
        }

        match normalize_url(absolute.as_str()) {
            Ok(normalized) => {
                let normalized = normalized.to_string();
                if seen.insert(normalized.clone()) {
                    links.push(normalized);
                }
            }
            Err(e) => tracing::debug!("Dropping link {}: {}", absolute, e),
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}
