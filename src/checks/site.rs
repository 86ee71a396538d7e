//! Site rule evaluators
//!
//! Site rules see the complete page set, so they only run once crawling
//! has finished.

use crate::checks::{preview, CheckError, CheckResult, PageDocument, Rule, Verdict};
use crate::robots::{fetch_robots, robots_url, RobotsFetch};
use crate::storage::PageRecord;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use url::Url;

const MAX_GROUPS_LISTED: usize = 5;
const MAX_URLS_PER_GROUP: usize = 5;
const MAX_REDIRECT_HOPS: usize = 10;

/// Inputs of a site rule
pub struct SiteContext<'a> {
    pub root: &'a Url,
    /// Parsed homepage markup, if it could be obtained
    pub homepage: Option<&'a PageDocument>,
    /// Every page crawled during the audit
    pub pages: &'a [PageRecord],
    pub client: &'a Client,
    /// Client that hands 3xx answers back instead of following them
    pub manual_client: &'a Client,
    pub aux_timeout: Duration,
}

/// Evaluates one site rule
pub async fn evaluate_site(rule: Rule, ctx: &SiteContext<'_>) -> CheckResult<Verdict> {
    let verdict = match rule {
        Rule::DuplicateTitles => {
            let groups = duplicate_groups(ctx.pages, |page| page.title.as_deref());
            duplicates(groups, Verdict::failed)
        }
        Rule::DuplicateMetaDescriptions => {
            let groups = duplicate_groups(ctx.pages, |page| page.meta_description.as_deref());
            duplicates(groups, Verdict::warning)
        }
        Rule::RobotsTxt => robots_txt(ctx).await,
        Rule::SitemapXml => sitemap_xml(ctx).await?,
        Rule::RedirectChains => redirect_chains(ctx).await?,
        Rule::LlmsTxt => llms_txt(ctx).await?,
        other => return Err(CheckError::WrongScope(other.name())),
    };

    Ok(verdict)
}

/// Groups crawled HTML pages by exact field value, keeping groups of two or more
fn duplicate_groups<'a, F>(pages: &'a [PageRecord], field: F) -> Vec<(&'a str, Vec<&'a str>)>
where
    F: Fn(&'a PageRecord) -> Option<&'a str>,
{
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for page in pages.iter().filter(|page| !page.is_resource) {
        if let Some(value) = field(page) {
            groups.entry(value).or_default().push(page.url.as_str());
        }
    }

    let mut duplicates: Vec<_> = groups
        .into_iter()
        .filter(|(_, urls)| urls.len() > 1)
        .collect();

    // Largest groups first; ties keep value order
    duplicates.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    duplicates
}

fn duplicates(groups: Vec<(&str, Vec<&str>)>, on_duplicate: fn(Value) -> Verdict) -> Verdict {
    if groups.is_empty() {
        return Verdict::passed(json!({ "duplicate_groups": 0 }));
    }

    let examples: Vec<Value> = groups
        .iter()
        .take(MAX_GROUPS_LISTED)
        .map(|(value, urls)| {
            json!({
                "value": preview(value, 100),
                "count": urls.len(),
                "urls": urls.iter().take(MAX_URLS_PER_GROUP).collect::<Vec<_>>(),
            })
        })
        .collect();

    on_duplicate(json!({
        "duplicate_groups": groups.len(),
        "examples": examples,
    }))
}

/// Missing or unreachable robots.txt fails; a file blocking everyone warns
async fn robots_txt(ctx: &SiteContext<'_>) -> Verdict {
    let url = robots_url(ctx.root).map(|u| u.to_string());

    let robots = match fetch_robots(ctx.client, ctx.root, ctx.aux_timeout).await {
        RobotsFetch::Found(robots) => robots,
        RobotsFetch::Missing(status) => {
            return Verdict::failed(json!({ "url": url, "status_code": status }))
        }
        RobotsFetch::Unreachable(error) => {
            return Verdict::failed(json!({ "url": url, "error": error }))
        }
    };

    let homepage_noindex = ctx
        .homepage
        .and_then(|doc| doc.robots_meta.as_deref())
        .is_some_and(|content| content.to_ascii_lowercase().contains("noindex"));

    let detail = json!({
        "url": url,
        "empty": robots.is_empty(),
        "sitemaps": robots.sitemaps(),
        "crawl_delay": robots.crawl_delay("*"),
        "blocks_site": robots.blocks_site(ctx.root.as_str()),
        "homepage_noindex": homepage_noindex,
    });

    if robots.blocks_site(ctx.root.as_str()) || homepage_noindex {
        Verdict::warning(detail)
    } else {
        Verdict::passed(detail)
    }
}

/// Looks for a sitemap declared by the homepage, by robots.txt, or at /sitemap.xml
async fn sitemap_xml(ctx: &SiteContext<'_>) -> CheckResult<Verdict> {
    let mut candidates: Vec<(Url, &'static str)> = Vec::new();

    if let Some(doc) = ctx.homepage {
        for href in &doc.sitemap_links {
            if let Ok(url) = ctx.root.join(href) {
                candidates.push((url, "homepage"));
            }
        }
    }

    if let RobotsFetch::Found(robots) = fetch_robots(ctx.client, ctx.root, ctx.aux_timeout).await {
        for href in robots.sitemaps() {
            if let Ok(url) = ctx.root.join(&href) {
                candidates.push((url, "robots_txt"));
            }
        }
    }

    let default = ctx
        .root
        .join("/sitemap.xml")
        .map_err(|e| CheckError::InvalidUrl(e.to_string()))?;
    candidates.push((default, "default_location"));

    let mut seen = HashSet::new();
    let mut tried = Vec::new();

    for (url, source) in candidates {
        if !seen.insert(url.to_string()) {
            continue;
        }

        match ctx.client.get(url.as_str()).timeout(ctx.aux_timeout).send().await {
            Ok(response) if response.status().is_success() => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("<urlset") || body.contains("<sitemapindex") {
                    return Ok(Verdict::passed(json!({ "url": url.as_str(), "source": source })));
                }
                tried.push(json!({ "url": url.as_str(), "reason": "not an XML sitemap" }));
            }
            Ok(response) => tried.push(json!({
                "url": url.as_str(),
                "status_code": response.status().as_u16(),
            })),
            Err(e) => tried.push(json!({ "url": url.as_str(), "error": e.to_string() })),
        }
    }

    Ok(Verdict::failed(json!({ "tried": tried })))
}

/// Reports redirect chains of two or more hops
///
/// Chains recorded while crawling come first, followed by the root and its
/// common variants, which are probed hop by hop. A loop or an endless chain
/// on a probed variant fails; any other chain warns.
async fn redirect_chains(ctx: &SiteContext<'_>) -> CheckResult<Verdict> {
    let mut chains = Vec::new();
    let mut reported = HashSet::new();
    let mut broken = false;

    for page in ctx.pages.iter().filter(|page| !page.is_resource) {
        if page.redirects.len() >= 2 && reported.insert(page.url.clone()) {
            chains.push(json!({
                "start": page.url,
                "hops": page.redirects,
                "looped": false,
            }));
        }
    }
    let crawled_chains = chains.len();

    for (index, start) in redirect_candidates(ctx.root).into_iter().enumerate() {
        let trace = match follow_redirects(ctx, &start).await {
            Ok(trace) => trace,
            // Without the root itself there is nothing to report on
            Err(e) if index == 0 => return Err(e),
            Err(e) => {
                tracing::debug!("Redirect probe of {} failed: {}", start, e);
                continue;
            }
        };

        if trace.looped || trace.hops.len() > MAX_REDIRECT_HOPS {
            broken = true;
        }
        let is_chain = trace.hops.len() >= 2 || trace.looped;
        if is_chain && reported.insert(start.to_string()) {
            chains.push(json!({
                "start": start.as_str(),
                "hops": trace.hops,
                "looped": trace.looped,
            }));
        }
    }

    let detail = json!({
        "chains": chains,
        "crawled_pages_with_chains": crawled_chains,
    });
    Ok(if broken {
        Verdict::failed(detail)
    } else if !chains.is_empty() {
        Verdict::warning(detail)
    } else {
        Verdict::passed(detail)
    })
}

/// The root, its plain-HTTP twin and its www twin
fn redirect_candidates(root: &Url) -> Vec<Url> {
    let mut candidates = vec![root.clone()];

    if root.scheme() == "https" {
        let mut http = root.clone();
        if http.set_scheme("http").is_ok() {
            candidates.push(http);
        }
    }

    if let Some(domain) = root.domain() {
        let twin = match domain.strip_prefix("www.") {
            Some(bare) => bare.to_string(),
            None => format!("www.{}", domain),
        };
        let mut www = root.clone();
        if www.set_host(Some(&twin)).is_ok() {
            candidates.push(www);
        }
    }

    candidates
}

struct RedirectTrace {
    /// Every Location followed, in order
    hops: Vec<String>,
    looped: bool,
}

async fn follow_redirects(ctx: &SiteContext<'_>, start: &Url) -> CheckResult<RedirectTrace> {
    let mut current = start.clone();
    let mut visited = HashSet::from([start.to_string()]);
    let mut hops = Vec::new();

    // One extra hop so that an endless chain shows up as longer than the limit
    while hops.len() <= MAX_REDIRECT_HOPS {
        let response = ctx
            .manual_client
            .get(current.as_str())
            .timeout(ctx.aux_timeout)
            .send()
            .await?;

        if !response.status().is_redirection() {
            break;
        }

        let Some(next) = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| current.join(location).ok())
        else {
            break;
        };

        hops.push(next.to_string());
        if !visited.insert(next.to_string()) {
            return Ok(RedirectTrace { hops, looped: true });
        }
        current = next;
    }

    Ok(RedirectTrace {
        hops,
        looped: false,
    })
}

async fn llms_txt(ctx: &SiteContext<'_>) -> CheckResult<Verdict> {
    let url = ctx
        .root
        .join("/llms.txt")
        .map_err(|e| CheckError::InvalidUrl(e.to_string()))?;

    let response = match ctx.client.get(url.as_str()).timeout(ctx.aux_timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            return Ok(Verdict::failed(
                json!({ "url": url.as_str(), "error": e.to_string() }),
            ))
        }
    };

    let status = response.status();
    // Soft 404s answer 200 with an HTML page
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));

    if !status.is_success() || is_html {
        return Ok(Verdict::failed(json!({
            "url": url.as_str(),
            "status_code": status.as_u16(),
        })));
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(Verdict::failed(json!({ "url": url.as_str(), "empty": true })));
    }

    Ok(Verdict::passed(json!({ "url": url.as_str(), "bytes": body.len() })))
}
