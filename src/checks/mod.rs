//! Check engine
//!
//! Every rule is a value of [`Rule`]. Its static metadata (category,
//! priority, display names, documentation link) comes from
//! [`Rule::definition`] and its evaluation is a `match` in [`page`] or
//! [`site`], so adding a rule means adding a variant, a table row and an
//! evaluator arm.
//!
//! Rules come in two disjoint scopes:
//! - page rules run once per crawled HTML page
//! - site rules run once per audit, after crawling has finished

mod document;
mod engine;
mod page;
mod site;

pub use document::{ImageFact, PageDocument};
pub use engine::CheckEngine;
pub use page::{evaluate_page, PageContext};
pub use site::{evaluate_site, SiteContext};

use crate::state::{Category, CheckStatus, Priority};
use crate::storage::{DismissalRecord, NewCheckResult};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors raised while evaluating a single rule
///
/// An erroring rule produces no check result at all.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Auxiliary request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rule {0} cannot run in this scope")]
    WrongScope(&'static str),
}

pub type CheckResult<T> = std::result::Result<T, CheckError>;

/// Where a rule is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Page,
    Site,
}

/// Static metadata of a rule
#[derive(Debug, Clone, Copy)]
pub struct RuleDefinition {
    pub name: &'static str,
    pub scope: RuleScope,
    pub category: Category,
    pub priority: Priority,
    /// Shown when the rule does not pass
    pub display_name: &'static str,
    /// Shown when the rule passes
    pub passed_name: &'static str,
    pub learn_more_url: &'static str,
    pub fix_guidance: Option<&'static str>,
}

/// Every rule the engine knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    // Page rules
    MissingTitle,
    TitleLength,
    MissingMetaDescription,
    MetaDescriptionLength,
    MissingH1,
    MultipleH1,
    HeadingHierarchy,
    HttpStatus,
    ViewportMeta,
    CanonicalLink,
    ImageAltText,
    StructuredData,
    LangAttribute,
    ThinContent,
    OversizedImages,
    // Site rules
    DuplicateTitles,
    DuplicateMetaDescriptions,
    RobotsTxt,
    SitemapXml,
    RedirectChains,
    LlmsTxt,
}

const PAGE_RULES: [Rule; 15] = [
    Rule::MissingTitle,
    Rule::TitleLength,
    Rule::MissingMetaDescription,
    Rule::MetaDescriptionLength,
    Rule::MissingH1,
    Rule::MultipleH1,
    Rule::HeadingHierarchy,
    Rule::HttpStatus,
    Rule::ViewportMeta,
    Rule::CanonicalLink,
    Rule::ImageAltText,
    Rule::StructuredData,
    Rule::LangAttribute,
    Rule::ThinContent,
    Rule::OversizedImages,
];

const SITE_RULES: [Rule; 6] = [
    Rule::DuplicateTitles,
    Rule::DuplicateMetaDescriptions,
    Rule::RobotsTxt,
    Rule::SitemapXml,
    Rule::RedirectChains,
    Rule::LlmsTxt,
];

impl Rule {
    pub fn page_rules() -> &'static [Rule] {
        &PAGE_RULES
    }

    pub fn site_rules() -> &'static [Rule] {
        &SITE_RULES
    }

    /// All rules, page rules first
    pub fn all() -> impl Iterator<Item = Rule> {
        PAGE_RULES.into_iter().chain(SITE_RULES)
    }

    pub fn name(&self) -> &'static str {
        self.definition().name
    }

    pub fn from_name(name: &str) -> Option<Rule> {
        Self::all().find(|rule| rule.name() == name)
    }

    /// Catalog entry of the rule
    #[rustfmt::skip]
    pub fn definition(&self) -> RuleDefinition {
        use Category::*;
        use Priority::*;
        use RuleScope::*;

        let (name, scope, category, priority, display_name, passed_name, learn_more_url, fix_guidance) =
            match self {
                Rule::MissingTitle => (
                    "missing_title", Page, Seo, Critical,
                    "Page title is missing", "Page has a title",
                    "https://developer.mozilla.org/en-US/docs/Web/HTML/Element/title",
                    Some("Add a unique, descriptive <title> element inside <head>."),
                ),
                Rule::TitleLength => (
                    "title_length", Page, Seo, Recommended,
                    "Page title length is outside 30-60 characters", "Page title length is good",
                    "https://developers.google.com/search/docs/appearance/title-link",
                    Some("Keep titles between 30 and 60 characters so they are not truncated in results."),
                ),
                Rule::MissingMetaDescription => (
                    "missing_meta_description", Page, Seo, Critical,
                    "Meta description is missing", "Page has a meta description",
                    "https://developers.google.com/search/docs/appearance/snippet",
                    Some("Add <meta name=\"description\" content=\"...\"> summarizing the page."),
                ),
                Rule::MetaDescriptionLength => (
                    "meta_description_length", Page, Seo, Recommended,
                    "Meta description length is outside 120-160 characters", "Meta description length is good",
                    "https://developers.google.com/search/docs/appearance/snippet",
                    Some("Aim for 120 to 160 characters."),
                ),
                Rule::MissingH1 => (
                    "missing_h1", Page, Technical, Critical,
                    "Page has no H1 heading", "Page has an H1 heading",
                    "https://developer.mozilla.org/en-US/docs/Web/HTML/Element/Heading_Elements",
                    Some("Add one <h1> describing the main topic of the page."),
                ),
                Rule::MultipleH1 => (
                    "multiple_h1", Page, Technical, Recommended,
                    "Page has more than one H1 heading", "Page has a single H1 heading",
                    "https://developer.mozilla.org/en-US/docs/Web/HTML/Element/Heading_Elements",
                    Some("Keep one <h1> per page and demote the others to <h2>."),
                ),
                Rule::HeadingHierarchy => (
                    "heading_hierarchy", Page, Technical, Recommended,
                    "Heading levels are skipped", "Heading hierarchy is consistent",
                    "https://www.w3.org/WAI/tutorials/page-structure/headings/",
                    Some("Do not skip heading levels (for example an <h2> followed by an <h4>)."),
                ),
                Rule::HttpStatus => (
                    "http_status", Page, Technical, Critical,
                    "Page answers with an error status", "Page answers successfully",
                    "https://developer.mozilla.org/en-US/docs/Web/HTTP/Status",
                    Some("Fix or redirect the URL, and update links pointing to it."),
                ),
                Rule::ViewportMeta => (
                    "viewport_meta", Page, Technical, Recommended,
                    "Viewport meta tag is missing", "Viewport meta tag is present",
                    "https://developer.mozilla.org/en-US/docs/Web/HTML/Viewport_meta_tag",
                    Some("Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">."),
                ),
                Rule::CanonicalLink => (
                    "canonical_link", Page, Seo, Optional,
                    "Canonical link is missing or invalid", "Canonical link is valid",
                    "https://developers.google.com/search/docs/crawling-indexing/consolidate-duplicate-urls",
                    Some("Add <link rel=\"canonical\" href=\"...\"> pointing to the preferred URL."),
                ),
                Rule::ImageAltText => (
                    "image_alt_text", Page, AiReadiness, Recommended,
                    "Images are missing alt text", "Images have alt text",
                    "https://developer.mozilla.org/en-US/docs/Web/API/HTMLImageElement/alt",
                    Some("Describe every meaningful image with an alt attribute; use alt=\"\" for decorative ones."),
                ),
                Rule::StructuredData => (
                    "structured_data", Page, AiReadiness, Recommended,
                    "Structured data is missing or invalid", "Structured data is present",
                    "https://developers.google.com/search/docs/appearance/structured-data/intro-structured-data",
                    Some("Describe the page with schema.org JSON-LD in a <script type=\"application/ld+json\">."),
                ),
                Rule::LangAttribute => (
                    "lang_attribute", Page, AiReadiness, Optional,
                    "Document language is not declared", "Document language is declared",
                    "https://developer.mozilla.org/en-US/docs/Web/HTML/Global_attributes/lang",
                    Some("Set the lang attribute on the <html> element."),
                ),
                Rule::ThinContent => (
                    "thin_content", Page, AiReadiness, Optional,
                    "Page has little text content", "Page has substantial text content",
                    "https://developers.google.com/search/docs/fundamentals/creating-helpful-content",
                    None,
                ),
                Rule::OversizedImages => (
                    "oversized_images", Page, Technical, Optional,
                    "Page loads oversized images", "Images are reasonably sized",
                    "https://web.dev/articles/serve-images-with-correct-dimensions",
                    Some("Compress images and serve modern formats such as WebP or AVIF."),
                ),
                Rule::DuplicateTitles => (
                    "duplicate_titles", Site, Seo, Recommended,
                    "Several pages share the same title", "Page titles are unique",
                    "https://developers.google.com/search/docs/appearance/title-link",
                    Some("Give every page its own title."),
                ),
                Rule::DuplicateMetaDescriptions => (
                    "duplicate_meta_descriptions", Site, Seo, Optional,
                    "Several pages share the same meta description", "Meta descriptions are unique",
                    "https://developers.google.com/search/docs/appearance/snippet",
                    Some("Write a specific description for each page."),
                ),
                Rule::RobotsTxt => (
                    "robots_txt", Site, Technical, Recommended,
                    "robots.txt is missing or blocks the site", "robots.txt is valid",
                    "https://developers.google.com/search/docs/crawling-indexing/robots/intro",
                    Some("Serve /robots.txt and make sure it does not disallow the whole site."),
                ),
                Rule::SitemapXml => (
                    "sitemap_xml", Site, Technical, Optional,
                    "XML sitemap not found", "XML sitemap found",
                    "https://developers.google.com/search/docs/crawling-indexing/sitemaps/overview",
                    Some("Publish /sitemap.xml and reference it from robots.txt."),
                ),
                Rule::RedirectChains => (
                    "redirect_chains", Site, Technical, Optional,
                    "Redirect chains detected", "No redirect chains",
                    "https://developers.google.com/search/docs/crawling-indexing/301-redirects",
                    Some("Redirect straight to the final URL in a single hop."),
                ),
                Rule::LlmsTxt => (
                    "llms_txt", Site, AiReadiness, Optional,
                    "llms.txt is missing", "llms.txt is present",
                    "https://llmstxt.org/",
                    Some("Publish /llms.txt describing the site for language models."),
                ),
            };

        RuleDefinition {
            name,
            scope,
            category,
            priority,
            display_name,
            passed_name,
            learn_more_url,
            fix_guidance,
        }
    }
}

/// What one rule found
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: CheckStatus,
    pub detail: serde_json::Value,
}

impl Verdict {
    pub fn passed(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Passed,
            detail,
        }
    }

    pub fn warning(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Warning,
            detail,
        }
    }

    pub fn failed(detail: serde_json::Value) -> Self {
        Self {
            status: CheckStatus::Failed,
            detail,
        }
    }

    /// Builds the row written to storage
    pub fn into_result(self, rule: Rule) -> NewCheckResult {
        let definition = rule.definition();
        NewCheckResult {
            category: definition.category,
            rule_name: definition.name.to_string(),
            priority: definition.priority,
            status: self.status,
            detail: self.detail,
            display_name: definition.display_name.to_string(),
            passed_name: definition.passed_name.to_string(),
            learn_more_url: definition.learn_more_url.to_string(),
            fix_guidance: definition.fix_guidance.map(str::to_string),
            is_site_wide: definition.scope == RuleScope::Site,
        }
    }
}

/// Tenant dismissals, matched by exact (rule name, URL)
#[derive(Debug, Clone, Default)]
pub struct Dismissals {
    pairs: HashSet<(String, String)>,
}

impl Dismissals {
    pub fn new(records: &[DismissalRecord]) -> Self {
        Self {
            pairs: records
                .iter()
                .map(|record| (record.rule_name.clone(), record.url.clone()))
                .collect(),
        }
    }

    pub fn is_dismissed(&self, rule: Rule, target: &str) -> bool {
        self.pairs
            .contains(&(rule.name().to_string(), target.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The URL a dismissal of `rule` is keyed by
    ///
    /// Page rules match the normalized page URL, site rules the site origin.
    pub fn target_for(rule: Rule, url: &Url) -> String {
        match rule.definition().scope {
            RuleScope::Page => url.to_string(),
            RuleScope::Site => crate::url::origin_of(url),
        }
    }
}

/// Truncates a preview to `max` characters
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push('…');
    truncated
}
