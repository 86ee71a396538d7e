//! Page rule evaluators

use crate::checks::{preview, CheckError, CheckResult, PageDocument, Rule, Verdict};
use crate::storage::PageRecord;
use futures::future::join_all;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const TITLE_LENGTH: (usize, usize) = (30, 60);
const META_DESCRIPTION_LENGTH: (usize, usize) = (120, 160);
const THIN_CONTENT_WORDS: usize = 300;
const MAX_IMAGES_PROBED: usize = 10;
const OVERSIZED_IMAGE_BYTES: u64 = 500 * 1024;
const PREVIEW_CHARS: usize = 100;
const MAX_LISTED: usize = 10;

/// Inputs of a page rule
///
/// `pages` is a read-only snapshot of the pages crawled so far.
pub struct PageContext<'a> {
    pub url: &'a Url,
    pub document: &'a PageDocument,
    pub status_code: u16,
    pub pages: &'a [PageRecord],
    pub client: &'a Client,
    pub aux_timeout: Duration,
}

/// Evaluates one page rule
pub async fn evaluate_page(rule: Rule, ctx: &PageContext<'_>) -> CheckResult<Verdict> {
    let doc = ctx.document;

    let verdict = match rule {
        Rule::MissingTitle => required(doc.title.as_deref()),
        Rule::TitleLength => length_band(doc.title.as_deref(), TITLE_LENGTH),
        Rule::MissingMetaDescription => required(doc.meta_description.as_deref()),
        Rule::MetaDescriptionLength => {
            length_band(doc.meta_description.as_deref(), META_DESCRIPTION_LENGTH)
        }
        Rule::MissingH1 => match doc.h1_count() {
            0 => Verdict::failed(json!({ "count": 0 })),
            count => Verdict::passed(json!({
                "count": count,
                "preview": doc.first_h1.as_deref().map(|h| preview(h, PREVIEW_CHARS)),
            })),
        },
        Rule::MultipleH1 => match doc.h1_count() {
            count if count > 1 => Verdict::warning(json!({ "count": count })),
            count => Verdict::passed(json!({ "count": count })),
        },
        Rule::HeadingHierarchy => heading_hierarchy(&doc.headings),
        Rule::HttpStatus => http_status(ctx.status_code),
        Rule::ViewportMeta => match doc.viewport.as_deref() {
            Some(content) if content.to_ascii_lowercase().contains("width") => {
                Verdict::passed(json!({ "content": content }))
            }
            Some(content) => Verdict::warning(json!({ "content": content })),
            None => Verdict::failed(json!({ "content": Value::Null })),
        },
        Rule::CanonicalLink => canonical_link(ctx),
        Rule::ImageAltText => image_alt_text(doc),
        Rule::StructuredData => structured_data(doc),
        Rule::LangAttribute => match doc.lang.as_deref() {
            Some(lang) => Verdict::passed(json!({ "lang": lang })),
            None => Verdict::failed(json!({ "lang": Value::Null })),
        },
        Rule::ThinContent => {
            let detail = json!({ "word_count": doc.word_count, "minimum": THIN_CONTENT_WORDS });
            if doc.word_count < THIN_CONTENT_WORDS {
                Verdict::warning(detail)
            } else {
                Verdict::passed(detail)
            }
        }
        Rule::OversizedImages => oversized_images(ctx).await,
        other => return Err(CheckError::WrongScope(other.name())),
    };

    Ok(verdict)
}

/// Missing-element rules: failed when absent, passed with a preview otherwise
fn required(value: Option<&str>) -> Verdict {
    match value {
        Some(value) => Verdict::passed(json!({ "preview": preview(value, PREVIEW_CHARS) })),
        None => Verdict::failed(json!({ "preview": Value::Null })),
    }
}

/// Length rules leave absence to the matching missing-element rule
fn length_band(value: Option<&str>, (min, max): (usize, usize)) -> Verdict {
    let Some(value) = value else {
        return Verdict::passed(json!({ "length": Value::Null, "min": min, "max": max }));
    };

    let length = value.chars().count();
    let detail = json!({
        "length": length,
        "min": min,
        "max": max,
        "preview": preview(value, PREVIEW_CHARS),
    });

    if (min..=max).contains(&length) {
        Verdict::passed(detail)
    } else {
        Verdict::warning(detail)
    }
}

/// Flags every jump of more than one level down (h2 -> h4)
fn heading_hierarchy(headings: &[u8]) -> Verdict {
    let violations: Vec<Value> = headings
        .windows(2)
        .filter(|pair| pair[1] > pair[0] + 1)
        .map(|pair| json!({ "from": format!("h{}", pair[0]), "to": format!("h{}", pair[1]) }))
        .collect();

    if violations.is_empty() {
        Verdict::passed(json!({ "headings": headings.len() }))
    } else {
        Verdict::warning(json!({ "violations": violations }))
    }
}

fn http_status(status_code: u16) -> Verdict {
    let detail = json!({ "status_code": status_code });
    if status_code >= 400 {
        Verdict::failed(detail)
    } else {
        Verdict::passed(detail)
    }
}

fn canonical_link(ctx: &PageContext<'_>) -> Verdict {
    let Some(href) = ctx.document.canonical.as_deref() else {
        return Verdict::warning(json!({ "canonical": Value::Null }));
    };

    let Ok(target) = ctx.url.join(href) else {
        return Verdict::failed(json!({ "canonical": href, "reason": "unparseable URL" }));
    };

    // A canonical pointing at a page that already answered with an error
    let broken = ctx
        .pages
        .iter()
        .find(|page| page.url == target.as_str())
        .and_then(|page| page.status_code)
        .filter(|&status| status >= 400);

    match broken {
        Some(status) => Verdict::warning(json!({
            "canonical": target.as_str(),
            "target_status": status,
        })),
        None => Verdict::passed(json!({
            "canonical": target.as_str(),
            "self_referencing": target == *ctx.url,
        })),
    }
}

/// Passed when every image has an alt attribute; failed when most do not
fn image_alt_text(doc: &PageDocument) -> Verdict {
    let missing: Vec<&str> = doc
        .images
        .iter()
        .filter(|image| image.alt.is_none())
        .map(|image| image.src.as_deref().unwrap_or(""))
        .collect();

    let detail = json!({
        "images": doc.images.len(),
        "missing_alt": missing.len(),
        "examples": missing.iter().take(MAX_LISTED).collect::<Vec<_>>(),
    });

    if missing.is_empty() {
        Verdict::passed(detail)
    } else if missing.len() * 2 > doc.images.len() {
        Verdict::failed(detail)
    } else {
        Verdict::warning(detail)
    }
}

fn structured_data(doc: &PageDocument) -> Verdict {
    let mut types = Vec::new();
    let mut invalid = 0;

    for block in &doc.json_ld {
        match serde_json::from_str::<Value>(block) {
            Ok(value) => collect_types(&value, &mut types),
            Err(_) => invalid += 1,
        }
    }

    let detail = json!({
        "json_ld_blocks": doc.json_ld.len(),
        "invalid_blocks": invalid,
        "microdata_items": doc.microdata_items,
        "types": types,
    });

    if doc.json_ld.is_empty() && doc.microdata_items == 0 {
        Verdict::failed(detail)
    } else if invalid > 0 {
        Verdict::warning(detail)
    } else {
        Verdict::passed(detail)
    }
}

/// Gathers `@type` values, descending into arrays and `@graph`
fn collect_types(value: &Value, types: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_types(item, types)),
        Value::Object(map) => {
            match map.get("@type") {
                Some(Value::String(t)) => types.push(t.clone()),
                Some(Value::Array(ts)) => {
                    types.extend(ts.iter().filter_map(Value::as_str).map(str::to_string))
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_types(graph, types);
            }
        }
        _ => {}
    }
}

/// HEADs up to ten images and flags those above the size threshold
///
/// Images whose size cannot be determined are not counted against the page.
async fn oversized_images(ctx: &PageContext<'_>) -> Verdict {
    let mut seen = HashSet::new();
    let targets: Vec<Url> = ctx
        .document
        .images
        .iter()
        .filter_map(|image| image.src.as_deref())
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .filter_map(|src| ctx.url.join(src).ok())
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .filter(|url| seen.insert(url.to_string()))
        .take(MAX_IMAGES_PROBED)
        .collect();

    let sizes = join_all(
        targets
            .iter()
            .map(|url| image_size(ctx.client, url, ctx.aux_timeout)),
    )
    .await;

    let oversized: Vec<Value> = targets
        .iter()
        .zip(sizes)
        .filter_map(|(url, size)| {
            size.filter(|&bytes| bytes > OVERSIZED_IMAGE_BYTES)
                .map(|bytes| json!({ "url": url.as_str(), "bytes": bytes }))
        })
        .collect();

    let detail = json!({
        "checked": targets.len(),
        "threshold_bytes": OVERSIZED_IMAGE_BYTES,
        "oversized": oversized,
    });

    if oversized.is_empty() {
        Verdict::passed(detail)
    } else {
        Verdict::warning(detail)
    }
}

async fn image_size(client: &Client, url: &Url, timeout: Duration) -> Option<u64> {
    let response = match client.head(url.as_str()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Image probe failed for {}: {}", url, e);
            return None;
        }
    };

    if !response.status().is_success() {
        return None;
    }

    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
