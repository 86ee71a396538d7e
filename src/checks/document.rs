//! Page facts extracted once per page
//!
//! `scraper::Html` is not `Send`, so the markup is parsed synchronously into
//! this plain struct before any rule is awaited.

use crate::crawler::{extract_meta_description, extract_title};
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::OnceLock;

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

/// One `<img>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFact {
    pub src: Option<String>,
    /// `None` when the attribute is absent; `Some("")` marks a decorative image
    pub alt: Option<String>,
}

/// Everything the page rules look at
#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    /// Heading levels (1-6) in document order
    pub headings: Vec<u8>,
    /// Text of the first `<h1>`
    pub first_h1: Option<String>,
    pub viewport: Option<String>,
    pub canonical: Option<String>,
    pub lang: Option<String>,
    pub images: Vec<ImageFact>,
    /// Raw bodies of `<script type="application/ld+json">`
    pub json_ld: Vec<String>,
    /// Number of elements carrying `itemscope`
    pub microdata_items: usize,
    /// Content of `<meta name="robots">`
    pub robots_meta: Option<String>,
    /// `<link rel="sitemap">` targets
    pub sitemap_links: Vec<String>,
    /// Words of visible body text
    pub word_count: usize,
}

impl PageDocument {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);

        Self {
            title: extract_title(&document),
            meta_description: extract_meta_description(&document),
            headings: headings(&document),
            first_h1: first_h1(&document),
            viewport: meta_content(&document, "viewport"),
            canonical: link_href(&document, "canonical").into_iter().next(),
            lang: lang(&document),
            images: images(&document),
            json_ld: json_ld(&document),
            microdata_items: microdata_items(&document),
            robots_meta: meta_content(&document, "robots"),
            sitemap_links: link_href(&document, "sitemap"),
            word_count: word_count(&document),
        }
    }

    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|&&level| level == 1).count()
    }
}

fn headings(document: &Html) -> Vec<u8> {
    static HEADINGS: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&HEADINGS, "h1, h2, h3, h4, h5, h6"))
        .filter_map(|element| {
            element
                .value()
                .name()
                .strip_prefix('h')
                .and_then(|level| level.parse().ok())
        })
        .collect()
}

fn first_h1(document: &Html) -> Option<String> {
    static H1: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&H1, "h1"))
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    static META: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&META, "meta[name]"))
        .find(|element| {
            element
                .value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
}

fn link_href(document: &Html, rel: &str) -> Vec<String> {
    static LINK: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&LINK, "link[rel][href]"))
        .filter(|element| {
            element.value().attr("rel").is_some_and(|value| {
                value
                    .split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case(rel))
            })
        })
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect()
}

fn lang(document: &Html) -> Option<String> {
    static HTML: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&HTML, "html"))
        .next()
        .and_then(|element| element.value().attr("lang"))
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
}

fn images(document: &Html) -> Vec<ImageFact> {
    static IMG: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&IMG, "img"))
        .map(|element| ImageFact {
            src: element.value().attr("src").map(|s| s.trim().to_string()),
            alt: element.value().attr("alt").map(|s| s.trim().to_string()),
        })
        .collect()
}

fn json_ld(document: &Html) -> Vec<String> {
    static SCRIPT: OnceLock<Selector> = OnceLock::new();

    document
        .select(selector(&SCRIPT, "script[type]"))
        .filter(|element| {
            element
                .value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        })
        .map(|element| element.text().collect::<String>())
        .collect()
}

fn microdata_items(document: &Html) -> usize {
    static ITEMSCOPE: OnceLock<Selector> = OnceLock::new();
    document.select(selector(&ITEMSCOPE, "[itemscope]")).count()
}

/// Counts words in text nodes of `<body>`, skipping script-like elements
fn word_count(document: &Html) -> usize {
    static BODY: OnceLock<Selector> = OnceLock::new();

    let Some(body) = document.select(selector(&BODY, "body")).next() else {
        return 0;
    };

    body.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(ElementRef::wrap)
                    .is_some_and(|parent| {
                        matches!(
                            parent.value().name(),
                            "script" | "style" | "noscript" | "template"
                        )
                    });
                (!hidden).then(|| text.split_whitespace().count())
            }
            _ => None,
        })
        .sum()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
