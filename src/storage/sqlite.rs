//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::scoring::ScoreCard;
use crate::state::{AuditStatus, Category, CheckStatus, Priority};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AuditRecord, CheckResultRecord, DismissalRecord, NewCheckResult, NewPage, PageRecord,
    QueueEntry,
};
use crate::url::ResourceType;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const AUDIT_COLUMNS: &str = "id, tenant_id, root_url, status, overall_score, seo_score,
    ai_readiness_score, technical_score, pages_crawled, urls_discovered, failed_count,
    warning_count, passed_count, summary, error_message, relaxed_tls, current_batch,
    homepage_html, started_at, completed_at, created_at, archived_at";

const PAGE_COLUMNS: &str = "id, audit_id, url, title, meta_description, status_code,
    last_modified, crawled_at, is_resource, resource_type, redirects";

const CHECK_COLUMNS: &str = "id, audit_id, page_id, category, rule_name, priority, status,
    detail, display_name, passed_name, learn_more_url, fix_guidance, is_site_wide, created_at";

const QUEUE_COLUMNS: &str = "id, audit_id, url, depth, discovered_at, crawled_at";

/// Timestamps share one fixed-width format so that text ordering matches time ordering
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets the CLI raise a stop request while a batch holds the database
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        root_url: row.get(2)?,
        status: AuditStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(AuditStatus::Failed),
        overall_score: row.get(4)?,
        seo_score: row.get(5)?,
        ai_readiness_score: row.get(6)?,
        technical_score: row.get(7)?,
        pages_crawled: row.get(8)?,
        urls_discovered: row.get(9)?,
        failed_count: row.get(10)?,
        warning_count: row.get(11)?,
        passed_count: row.get(12)?,
        summary: row.get(13)?,
        error_message: row.get(14)?,
        relaxed_tls: row.get(15)?,
        current_batch: row.get(16)?,
        homepage_html: row.get(17)?,
        started_at: row.get(18)?,
        completed_at: row.get(19)?,
        created_at: row.get(20)?,
        archived_at: row.get(21)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    let resource_type: Option<String> = row.get(9)?;
    let redirects: Option<String> = row.get(10)?;
    let redirects = match redirects {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => Vec::new(),
    };
    Ok(PageRecord {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        meta_description: row.get(4)?,
        status_code: row.get(5)?,
        last_modified: row.get(6)?,
        crawled_at: row.get(7)?,
        is_resource: row.get(8)?,
        resource_type: resource_type.as_deref().and_then(ResourceType::from_db_string),
        redirects,
    })
}

fn queue_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        url: row.get(2)?,
        depth: row.get(3)?,
        discovered_at: row.get(4)?,
        crawled_at: row.get(5)?,
    })
}

/// Raw check row; enum columns are decoded after the query so that a corrupt
/// value surfaces as a `StorageError` instead of a silent default
struct RawCheckRow {
    record: CheckResultRecord,
    category: String,
    priority: String,
    status: String,
    detail: String,
}

fn raw_check_from_row(row: &Row<'_>) -> rusqlite::Result<RawCheckRow> {
    Ok(RawCheckRow {
        record: CheckResultRecord {
            id: row.get(0)?,
            audit_id: row.get(1)?,
            page_id: row.get(2)?,
            category: Category::Seo,
            rule_name: row.get(4)?,
            priority: Priority::Optional,
            status: CheckStatus::Passed,
            detail: serde_json::Value::Null,
            display_name: row.get(8)?,
            passed_name: row.get(9)?,
            learn_more_url: row.get(10)?,
            fix_guidance: row.get(11)?,
            is_site_wide: row.get(12)?,
            created_at: row.get(13)?,
        },
        category: row.get(3)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        detail: row.get(7)?,
    })
}

impl RawCheckRow {
    fn decode(self) -> StorageResult<CheckResultRecord> {
        let mut record = self.record;
        record.category =
            Category::from_db_string(&self.category).ok_or(StorageError::CorruptValue {
                column: "category",
                value: self.category.clone(),
            })?;
        record.priority =
            Priority::from_db_string(&self.priority).ok_or(StorageError::CorruptValue {
                column: "priority",
                value: self.priority.clone(),
            })?;
        record.status =
            CheckStatus::from_db_string(&self.status).ok_or(StorageError::CorruptValue {
                column: "status",
                value: self.status.clone(),
            })?;
        record.detail = serde_json::from_str(&self.detail)?;
        Ok(record)
    }
}

impl Storage for SqliteStorage {
    // ===== Audit Management =====

    fn create_audit(&mut self, root_url: &str, tenant_id: Option<i64>) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO audits (tenant_id, root_url, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![tenant_id, root_url, AuditStatus::Pending.to_db_string(), now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_audit(&self, audit_id: i64) -> StorageResult<AuditRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM audits WHERE id = ?1", AUDIT_COLUMNS),
                params![audit_id],
                audit_from_row,
            )
            .optional()?
            .ok_or(StorageError::AuditNotFound(audit_id))
    }

    fn list_audits(&self) -> StorageResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audits ORDER BY id DESC",
            AUDIT_COLUMNS
        ))?;

        let audits = stmt
            .query_map([], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(audits)
    }

    fn update_audit_status(&mut self, audit_id: i64, status: AuditStatus) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE audits SET status = ?1
             WHERE id = ?2
               AND status NOT IN ('completed', 'failed', 'stopped')
               AND (status != 'stop_requested' OR ?1 IN ('stop_requested', 'stopped', 'failed'))",
            params![status.to_db_string(), audit_id],
        )?;
        Ok(changed > 0)
    }

    fn request_stop(&mut self, audit_id: i64) -> StorageResult<bool> {
        self.update_audit_status(audit_id, AuditStatus::StopRequested)
    }

    fn start_audit(&mut self, audit_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET status = ?1, started_at = COALESCE(started_at, ?2)
             WHERE id = ?3 AND status = ?4",
            params![
                AuditStatus::Crawling.to_db_string(),
                now(),
                audit_id,
                AuditStatus::Pending.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn begin_batch(&mut self, audit_id: i64) -> StorageResult<u32> {
        self.conn
            .query_row(
                "UPDATE audits SET current_batch = current_batch + 1 WHERE id = ?1
                 RETURNING current_batch",
                params![audit_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::AuditNotFound(audit_id))
    }

    fn set_relaxed_tls(&mut self, audit_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET relaxed_tls = 1 WHERE id = ?1",
            params![audit_id],
        )?;
        Ok(())
    }

    fn set_homepage_html(&mut self, audit_id: i64, html: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET homepage_html = ?1 WHERE id = ?2",
            params![html, audit_id],
        )?;
        Ok(())
    }

    fn update_progress(
        &mut self,
        audit_id: i64,
        pages_crawled: u32,
        urls_discovered: u32,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET pages_crawled = ?1, urls_discovered = ?2 WHERE id = ?3",
            params![pages_crawled, urls_discovered, audit_id],
        )?;
        Ok(())
    }

    fn save_scores(&mut self, audit_id: i64, scores: &ScoreCard) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET overall_score = ?1, seo_score = ?2, ai_readiness_score = ?3,
             technical_score = ?4, failed_count = ?5, warning_count = ?6, passed_count = ?7
             WHERE id = ?8",
            params![
                scores.overall,
                scores.seo,
                scores.ai_readiness,
                scores.technical,
                scores.failed_count,
                scores.warning_count,
                scores.passed_count,
                audit_id
            ],
        )?;
        Ok(())
    }

    fn set_summary(&mut self, audit_id: i64, summary: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET summary = ?1 WHERE id = ?2",
            params![summary, audit_id],
        )?;
        Ok(())
    }

    fn finish_audit(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        // A stop request that arrived during finalization wins over `completed`
        let changed = self.conn.execute(
            "UPDATE audits SET
             status = CASE WHEN ?1 = 'completed' AND status = 'stop_requested'
                      THEN 'stopped' ELSE ?1 END,
             error_message = COALESCE(?2, error_message),
             completed_at = ?3
             WHERE id = ?4 AND status NOT IN ('completed', 'failed', 'stopped')",
            params![status.to_db_string(), error_message, now(), audit_id],
        )?;

        if changed == 0 {
            tracing::warn!("Audit {} was already terminal, kept its status", audit_id);
        }

        Ok(())
    }

    // ===== Page Management =====

    fn insert_page(&mut self, audit_id: i64, page: &NewPage) -> StorageResult<i64> {
        let redirects = if page.redirects.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&page.redirects)?)
        };

        self.conn.execute(
            "INSERT INTO pages (audit_id, url, title, meta_description, status_code, last_modified,
             crawled_at, is_resource, resource_type, redirects)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                audit_id,
                page.url,
                page.title,
                page.meta_description,
                page.status_code,
                page.last_modified,
                now(),
                page.resource_type.is_some(),
                page.resource_type.map(|r| r.to_db_string()),
                redirects,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_pages(&self, audit_id: i64) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE audit_id = ?1 ORDER BY id ASC",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(params![audit_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn get_page_by_url(&self, audit_id: i64, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE audit_id = ?1 AND url = ?2",
                    PAGE_COLUMNS
                ),
                params![audit_id, url],
                page_from_row,
            )
            .optional()?;

        Ok(page)
    }

    fn count_fetched_pages(&self, audit_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE audit_id = ?1 AND status_code IS NOT NULL",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_pages(&self, audit_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE audit_id = ?1",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Crawl Queue =====

    fn enqueue_urls(
        &mut self,
        audit_id: i64,
        urls: &[String],
        depth: u32,
    ) -> StorageResult<usize> {
        let discovered_at = now();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO crawl_queue (audit_id, url, depth, discovered_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for url in urls {
                inserted += stmt.execute(params![audit_id, url, depth, discovered_at])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn claim_next(&mut self, audit_id: i64) -> StorageResult<Option<QueueEntry>> {
        // Single conditional update: the row is only claimed if still unclaimed
        let entry = self
            .conn
            .query_row(
                &format!(
                    "UPDATE crawl_queue SET crawled_at = ?1
                     WHERE id = (
                         SELECT id FROM crawl_queue
                         WHERE audit_id = ?2 AND crawled_at IS NULL
                         ORDER BY depth ASC, discovered_at ASC, id ASC
                         LIMIT 1
                     )
                     AND crawled_at IS NULL
                     RETURNING {}",
                    QUEUE_COLUMNS
                ),
                params![now(), audit_id],
                queue_from_row,
            )
            .optional()?;

        Ok(entry)
    }

    fn count_pending(&self, audit_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_queue WHERE audit_id = ?1 AND crawled_at IS NULL",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_queued(&self, audit_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_queue WHERE audit_id = ?1",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_queue(&self, audit_id: i64) -> StorageResult<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_queue WHERE audit_id = ?1
             ORDER BY depth ASC, discovered_at ASC, id ASC",
            QUEUE_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![audit_id], queue_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // ===== Check Results =====

    fn insert_check_results(
        &mut self,
        audit_id: i64,
        page_id: Option<i64>,
        results: &[NewCheckResult],
    ) -> StorageResult<()> {
        let created_at = now();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO check_results (audit_id, page_id, category, rule_name, priority,
                 status, detail, display_name, passed_name, learn_more_url, fix_guidance,
                 is_site_wide, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;

            for result in results {
                let detail = serde_json::to_string(&result.detail)?;
                stmt.execute(params![
                    audit_id,
                    page_id,
                    result.category.to_db_string(),
                    result.rule_name,
                    result.priority.to_db_string(),
                    result.status.to_db_string(),
                    detail,
                    result.display_name,
                    result.passed_name,
                    result.learn_more_url,
                    result.fix_guidance,
                    result.is_site_wide,
                    created_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn list_check_results(&self, audit_id: i64) -> StorageResult<Vec<CheckResultRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM check_results WHERE audit_id = ?1 ORDER BY id ASC",
            CHECK_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![audit_id], raw_check_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawCheckRow::decode).collect()
    }

    fn count_site_wide_results(&self, audit_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM check_results WHERE audit_id = ?1 AND is_site_wide = 1",
            params![audit_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Dismissals =====

    fn add_dismissal(
        &mut self,
        tenant_id: i64,
        rule_name: &str,
        url: &str,
        created_by: Option<i64>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO dismissals (tenant_id, rule_name, url, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tenant_id, rule_name, url, created_by, now()],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM dismissals WHERE tenant_id = ?1 AND rule_name = ?2 AND url = ?3",
            params![tenant_id, rule_name, url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn list_dismissals(&self, tenant_id: i64) -> StorageResult<Vec<DismissalRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, rule_name, url, created_by, created_at
             FROM dismissals WHERE tenant_id = ?1 ORDER BY id ASC",
        )?;

        let dismissals = stmt
            .query_map(params![tenant_id], |row| {
                Ok(DismissalRecord {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    rule_name: row.get(2)?,
                    url: row.get(3)?,
                    created_by: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(dismissals)
    }
}
