//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Site-Auditor database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One crawl-and-check run against one root URL
CREATE TABLE IF NOT EXISTS audits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER,
    root_url TEXT NOT NULL,
    status TEXT NOT NULL,
    overall_score INTEGER,
    seo_score INTEGER,
    ai_readiness_score INTEGER,
    technical_score INTEGER,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    urls_discovered INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    warning_count INTEGER NOT NULL DEFAULT 0,
    passed_count INTEGER NOT NULL DEFAULT 0,
    summary TEXT,
    error_message TEXT,
    relaxed_tls INTEGER NOT NULL DEFAULT 0,
    current_batch INTEGER NOT NULL DEFAULT 0,
    homepage_html TEXT,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    archived_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_audits_tenant ON audits(tenant_id);

-- One fetched URL belonging to an audit
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    url TEXT NOT NULL,
    title TEXT,
    meta_description TEXT,
    status_code INTEGER,
    last_modified TEXT,
    crawled_at TEXT NOT NULL,
    is_resource INTEGER NOT NULL DEFAULT 0,
    resource_type TEXT,
    -- JSON array of every Location followed, NULL when the page was not redirected
    redirects TEXT,
    UNIQUE(audit_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_audit ON pages(audit_id);

-- One rule evaluated against one page (or the whole site when page_id is NULL)
CREATE TABLE IF NOT EXISTS check_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    page_id INTEGER REFERENCES pages(id),
    category TEXT NOT NULL,
    rule_name TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL,
    detail TEXT NOT NULL,
    display_name TEXT NOT NULL,
    passed_name TEXT NOT NULL,
    learn_more_url TEXT NOT NULL,
    fix_guidance TEXT,
    is_site_wide INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_check_results_audit ON check_results(audit_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_check_results_page_rule
    ON check_results(audit_id, rule_name, page_id) WHERE page_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_check_results_site_rule
    ON check_results(audit_id, rule_name) WHERE page_id IS NULL;

-- Crawl frontier; crawled_at NULL means still pending
CREATE TABLE IF NOT EXISTS crawl_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    crawled_at TEXT,
    UNIQUE(audit_id, url)
);

CREATE INDEX IF NOT EXISTS idx_crawl_queue_pending
    ON crawl_queue(audit_id, crawled_at, depth, discovered_at);

-- Tenant-scoped suppression of a (rule, url) finding
CREATE TABLE IF NOT EXISTS dismissals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    rule_name TEXT NOT NULL,
    url TEXT NOT NULL,
    created_by INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(tenant_id, rule_name, url)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
