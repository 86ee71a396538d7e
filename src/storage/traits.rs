//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::scoring::ScoreCard;
use crate::state::AuditStatus;
use crate::storage::{
    AuditRecord, CheckResultRecord, DismissalRecord, NewCheckResult, NewPage, PageRecord,
    QueueEntry,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Audit not found: {0}")]
    AuditNotFound(i64),

    #[error("Corrupt value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the orchestrator,
/// the check engine and the reporting code.
pub trait Storage {
    // ===== Audit Management =====

    /// Creates a new audit in the `pending` state and returns its ID
    fn create_audit(&mut self, root_url: &str, tenant_id: Option<i64>) -> StorageResult<i64>;

    /// Gets an audit by ID
    fn get_audit(&self, audit_id: i64) -> StorageResult<AuditRecord>;

    /// Lists audits, newest first
    fn list_audits(&self) -> StorageResult<Vec<AuditRecord>>;

    /// Moves an audit to a new status
    ///
    /// The update is skipped when the audit is already terminal, or when a
    /// stop was requested and `status` is neither `stopped` nor `failed`.
    ///
    /// # Returns
    ///
    /// `true` if the row was updated
    fn update_audit_status(&mut self, audit_id: i64, status: AuditStatus) -> StorageResult<bool>;

    /// Raises the cancellation signal for a non-terminal audit
    fn request_stop(&mut self, audit_id: i64) -> StorageResult<bool>;

    /// Records the start timestamp and moves a pending audit to `crawling`
    fn start_audit(&mut self, audit_id: i64) -> StorageResult<()>;

    /// Increments the batch counter and returns the new value
    fn begin_batch(&mut self, audit_id: i64) -> StorageResult<u32>;

    /// Persists that TLS verification must be relaxed for this audit
    fn set_relaxed_tls(&mut self, audit_id: i64) -> StorageResult<()>;

    /// Stores the homepage markup used by site-wide checks
    fn set_homepage_html(&mut self, audit_id: i64, html: &str) -> StorageResult<()>;

    /// Updates the crawl progress counters
    fn update_progress(
        &mut self,
        audit_id: i64,
        pages_crawled: u32,
        urls_discovered: u32,
    ) -> StorageResult<()>;

    /// Stores the final scores and status tallies
    fn save_scores(&mut self, audit_id: i64, scores: &ScoreCard) -> StorageResult<()>;

    /// Stores the narrative summary
    fn set_summary(&mut self, audit_id: i64, summary: &str) -> StorageResult<()>;

    /// Moves the audit to a terminal status and stamps `completed_at`
    fn finish_audit(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    // ===== Page Management =====

    /// Inserts a crawled page and returns its ID
    fn insert_page(&mut self, audit_id: i64, page: &NewPage) -> StorageResult<i64>;

    /// Gets all pages of an audit in crawl order
    fn list_pages(&self, audit_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Gets a page by URL
    fn get_page_by_url(&self, audit_id: i64, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Counts pages that were fetched and answered with a status code
    fn count_fetched_pages(&self, audit_id: i64) -> StorageResult<u64>;

    /// Counts every page row of an audit
    fn count_pages(&self, audit_id: i64) -> StorageResult<u64>;

    // ===== Crawl Queue =====

    /// Adds URLs to the queue at the given depth, ignoring URLs already present
    ///
    /// # Returns
    ///
    /// The number of URLs actually inserted
    fn enqueue_urls(&mut self, audit_id: i64, urls: &[String], depth: u32)
        -> StorageResult<usize>;

    /// Atomically claims the next pending entry (depth, then discovery time)
    ///
    /// The entry is marked crawled before it is returned, so a crash while
    /// fetching drops the page instead of retrying it forever.
    fn claim_next(&mut self, audit_id: i64) -> StorageResult<Option<QueueEntry>>;

    /// Counts entries still pending
    fn count_pending(&self, audit_id: i64) -> StorageResult<u64>;

    /// Counts every entry ever queued
    fn count_queued(&self, audit_id: i64) -> StorageResult<u64>;

    /// Gets all queue entries in claim order
    fn list_queue(&self, audit_id: i64) -> StorageResult<Vec<QueueEntry>>;

    // ===== Check Results =====

    /// Writes the results of one page (or the site-wide set) in one transaction
    fn insert_check_results(
        &mut self,
        audit_id: i64,
        page_id: Option<i64>,
        results: &[NewCheckResult],
    ) -> StorageResult<()>;

    /// Gets all check results of an audit
    fn list_check_results(&self, audit_id: i64) -> StorageResult<Vec<CheckResultRecord>>;

    /// Counts site-wide check results of an audit
    fn count_site_wide_results(&self, audit_id: i64) -> StorageResult<u64>;

    // ===== Dismissals =====

    /// Records a dismissal (idempotent) and returns its ID
    fn add_dismissal(
        &mut self,
        tenant_id: i64,
        rule_name: &str,
        url: &str,
        created_by: Option<i64>,
    ) -> StorageResult<i64>;

    /// Gets all dismissals of a tenant
    fn list_dismissals(&self, tenant_id: i64) -> StorageResult<Vec<DismissalRecord>>;
}
