//! Storage module for persisting audit data
//!
//! This module handles all database operations for the auditor, including:
//! - SQLite database initialization and schema management
//! - Audit lifecycle and counters
//! - Crawled pages and check results
//! - Crawl queue (frontier) persistence with crash-safe claiming
//! - Tenant dismissals

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::scoring::ScoreCard;
use crate::state::{AuditStatus, Category, CheckStatus, Priority};
use crate::url::ResourceType;

/// Represents an audit in the database
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: i64,
    pub tenant_id: Option<i64>,
    pub root_url: String,
    pub status: AuditStatus,
    pub overall_score: Option<u32>,
    pub seo_score: Option<u32>,
    pub ai_readiness_score: Option<u32>,
    pub technical_score: Option<u32>,
    pub pages_crawled: u32,
    pub urls_discovered: u32,
    pub failed_count: u32,
    pub warning_count: u32,
    pub passed_count: u32,
    pub summary: Option<String>,
    pub error_message: Option<String>,
    pub relaxed_tls: bool,
    pub current_batch: u32,
    pub homepage_html: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub archived_at: Option<String>,
}

impl AuditRecord {
    /// Returns the persisted scores, if the audit has been scored
    pub fn score_card(&self) -> Option<ScoreCard> {
        Some(ScoreCard {
            overall: self.overall_score?,
            seo: self.seo_score?,
            ai_readiness: self.ai_readiness_score?,
            technical: self.technical_score?,
            failed_count: self.failed_count,
            warning_count: self.warning_count,
            passed_count: self.passed_count,
        })
    }
}

/// Represents a crawled page in the database
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub audit_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub status_code: Option<u16>,
    pub last_modified: Option<String>,
    pub crawled_at: String,
    pub is_resource: bool,
    pub resource_type: Option<ResourceType>,
    /// Every redirect hop followed to reach the page, in order
    pub redirects: Vec<String>,
}

impl PageRecord {
    /// Returns true if the page was fetched and answered with a status code
    pub fn was_fetched(&self) -> bool {
        self.status_code.is_some()
    }
}

/// A page about to be written
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub status_code: Option<u16>,
    pub last_modified: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub redirects: Vec<String>,
}

/// Represents a check result in the database
#[derive(Debug, Clone)]
pub struct CheckResultRecord {
    pub id: i64,
    pub audit_id: i64,
    pub page_id: Option<i64>,
    pub category: Category,
    pub rule_name: String,
    pub priority: Priority,
    pub status: CheckStatus,
    pub detail: serde_json::Value,
    pub display_name: String,
    pub passed_name: String,
    pub learn_more_url: String,
    pub fix_guidance: Option<String>,
    pub is_site_wide: bool,
    pub created_at: String,
}

/// A check result about to be written
#[derive(Debug, Clone)]
pub struct NewCheckResult {
    pub category: Category,
    pub rule_name: String,
    pub priority: Priority,
    pub status: CheckStatus,
    pub detail: serde_json::Value,
    pub display_name: String,
    pub passed_name: String,
    pub learn_more_url: String,
    pub fix_guidance: Option<String>,
    pub is_site_wide: bool,
}

/// Represents a crawl queue entry
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub audit_id: i64,
    pub url: String,
    pub depth: u32,
    pub discovered_at: String,
    pub crawled_at: Option<String>,
}

/// Represents a tenant dismissal
#[derive(Debug, Clone)]
pub struct DismissalRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub rule_name: String,
    pub url: String,
    pub created_by: Option<i64>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AuditRecord {
        AuditRecord {
            id: 1,
            tenant_id: None,
            root_url: "https://x.test/".to_string(),
            status: AuditStatus::Completed,
            overall_score: Some(80),
            seo_score: Some(70),
            ai_readiness_score: Some(90),
            technical_score: Some(80),
            pages_crawled: 3,
            urls_discovered: 3,
            failed_count: 1,
            warning_count: 2,
            passed_count: 10,
            summary: None,
            error_message: None,
            relaxed_tls: false,
            current_batch: 1,
            homepage_html: None,
            started_at: None,
            completed_at: None,
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            archived_at: None,
        }
    }

    #[test]
    fn test_score_card_present() {
        let card = audit().score_card().unwrap();
        assert_eq!(card.overall, 80);
        assert_eq!(card.passed_count, 10);
    }

    #[test]
    fn test_score_card_absent_until_scored() {
        let mut record = audit();
        record.technical_score = None;
        assert!(record.score_card().is_none());
    }
}
