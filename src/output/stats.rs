//! Page statistics of an audit
//!
//! Counts derived from the persisted page set, shown in the report.

use crate::storage::PageRecord;
use std::collections::BTreeMap;

/// Crawl statistics of one audit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStatistics {
    /// Every page row, resources included
    pub total: u64,

    /// HTML pages that answered with a status code
    pub fetched: u64,

    /// Pages or resources whose request failed outright
    pub unreachable: u64,

    /// HTML pages answering 4xx or 5xx
    pub error_pages: u64,

    /// Number of HTML pages per status code
    pub by_status: BTreeMap<u16, u64>,

    /// Number of downloadable resources per type
    pub resources: BTreeMap<&'static str, u64>,
}

impl PageStatistics {
    /// Computes statistics from the pages of one audit
    pub fn from_pages(pages: &[PageRecord]) -> Self {
        let mut stats = Self {
            total: pages.len() as u64,
            ..Self::default()
        };

        for page in pages {
            if let Some(resource_type) = page.resource_type {
                *stats.resources.entry(resource_type.to_db_string()).or_default() += 1;
                if !page.was_fetched() {
                    stats.unreachable += 1;
                }
                continue;
            }

            match page.status_code {
                Some(code) => {
                    stats.fetched += 1;
                    *stats.by_status.entry(code).or_default() += 1;
                    if code >= 400 {
                        stats.error_pages += 1;
                    }
                }
                None => stats.unreachable += 1,
            }
        }

        stats
    }

    /// Total number of downloadable resources
    pub fn resource_count(&self) -> u64 {
        self.resources.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::ResourceType;

    fn page(
        url: &str,
        status_code: Option<u16>,
        resource_type: Option<ResourceType>,
    ) -> PageRecord {
        PageRecord {
            id: 0,
            audit_id: 1,
            url: url.to_string(),
            title: None,
            meta_description: None,
            status_code,
            last_modified: None,
            crawled_at: String::new(),
            is_resource: resource_type.is_some(),
            resource_type,
            redirects: Vec::new(),
        }
    }

    #[test]
    fn test_statistics_from_pages() {
        let pages = vec![
            page("https://x.test/", Some(200), None),
            page("https://x.test/a", Some(200), None),
            page("https://x.test/gone", Some(404), None),
            page("https://x.test/down", None, None),
            page("https://x.test/doc.pdf", Some(200), Some(ResourceType::Pdf)),
            page("https://x.test/b.pdf", None, Some(ResourceType::Pdf)),
            page("https://x.test/a.zip", Some(200), Some(ResourceType::Archive)),
        ];

        let stats = PageStatistics::from_pages(&pages);

        assert_eq!(stats.total, 7);
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.unreachable, 2);
        assert_eq!(stats.error_pages, 1);
        assert_eq!(stats.by_status.get(&200), Some(&2));
        assert_eq!(stats.by_status.get(&404), Some(&1));
        assert_eq!(stats.resources.get("pdf"), Some(&2));
        assert_eq!(stats.resource_count(), 3);
    }

    #[test]
    fn test_empty_statistics() {
        assert_eq!(PageStatistics::from_pages(&[]), PageStatistics::default());
    }
}
