//! Crawler module for web page fetching and processing
//!
//! This module contains the crawling building blocks, including:
//! - HTTP fetching with relaxed TLS fallback
//! - HTML parsing and same-site link extraction
//! - The persisted breadth-first frontier
//!
//! The per-batch loop that drives them lives in [`crate::audit`].

mod fetcher;
mod frontier;
mod parser;

pub use fetcher::{build_http_client, parse_last_modified, FetchResult, Fetcher};
pub use frontier::Frontier;
pub use parser::{parse_html, ParsedPage};

pub(crate) use parser::{extract_meta_description, extract_title};
