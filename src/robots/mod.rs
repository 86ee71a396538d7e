//! Robots.txt handling module
//!
//! This module fetches and parses a site's robots.txt. The audit does not
//! obey it while crawling; it reports on it through the `robots_txt` and
//! `sitemap_xml` checks.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Outcome of fetching `/robots.txt`
#[derive(Debug, Clone)]
pub enum RobotsFetch {
    /// The file exists (2xx)
    Found(ParsedRobots),
    /// The server answered with a non-2xx status
    Missing(u16),
    /// The request itself failed
    Unreachable(String),
}

/// Returns the robots.txt URL of the site `url` belongs to
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}

/// Fetches robots.txt for a site
///
/// # Arguments
///
/// * `client` - The HTTP client (carrying the audit's TLS mode)
/// * `site` - Any URL of the site
/// * `timeout` - Timeout of this request
pub async fn fetch_robots(client: &Client, site: &Url, timeout: Duration) -> RobotsFetch {
    let Some(url) = robots_url(site) else {
        return RobotsFetch::Unreachable(format!("No robots.txt location for {}", site));
    };

    let response = match client.get(url.as_str()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("robots.txt fetch failed for {}: {}", url, e);
            return RobotsFetch::Unreachable(e.to_string());
        }
    };

    let status = response.status();
    if !status.is_success() {
        return RobotsFetch::Missing(status.as_u16());
    }

    match response.text().await {
        Ok(body) => RobotsFetch::Found(ParsedRobots::from_content(&body)),
        Err(e) => RobotsFetch::Unreachable(e.to_string()),
    }
}
