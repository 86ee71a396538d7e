//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

/// Agent name used to evaluate the wildcard group
const ANY_AGENT: &str = "AnyBot";

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, plus the two
/// non-standard directives the audit reports on (`Crawl-delay`, `Sitemap`).
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns true if the file has no directive at all
    pub fn is_empty(&self) -> bool {
        self.content
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'))
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL (or path) to check
    /// * `user_agent` - The user agent string
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns true if the wildcard group disallows the whole site
    ///
    /// `site_root` must be an absolute URL such as `https://example.com/`.
    pub fn blocks_site(&self, site_root: &str) -> bool {
        !self.is_allowed(site_root, ANY_AGENT)
    }

    /// Lists the `Sitemap:` directives, in file order
    pub fn sitemaps(&self) -> Vec<String> {
        self.content
            .lines()
            .filter_map(|line| {
                let (key, value) = line.trim().split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("sitemap")
                    .then(|| value.trim().to_string())
            })
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        // Crawl-delay applies to the most recent User-agent group
        let mut current_user_agents: Vec<String> = Vec::new();
        let mut crawl_delay_for_wildcard: Option<f64> = None;
        let mut crawl_delay_for_agent: Option<f64> = None;
        let mut in_rules = false;

        let normalized_agent = user_agent.to_lowercase();

        for line in self.content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A User-agent line after rules opens a new group
                    if in_rules {
                        current_user_agents.clear();
                        in_rules = false;
                    }
                    current_user_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if current_user_agents.iter().any(|ua| ua == "*") {
                        crawl_delay_for_wildcard = Some(delay);
                    } else if current_user_agents
                        .iter()
                        .any(|ua| normalized_agent.contains(ua.as_str()))
                    {
                        crawl_delay_for_agent = Some(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        // Prefer specific user-agent delay over wildcard delay
        crawl_delay_for_agent.or(crawl_delay_for_wildcard)
    }
}
