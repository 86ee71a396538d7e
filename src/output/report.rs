//! Plain-text audit report
//!
//! Built entirely from persisted state, so it can be printed for an audit
//! that is still running.

use crate::output::stats::PageStatistics;
use crate::state::{CheckStatus, Priority};
use crate::storage::{AuditRecord, CheckResultRecord, Storage, StorageResult};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Affected URLs listed under one finding
const MAX_URLS_PER_FINDING: usize = 10;

/// All results of one rule sharing one status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule_name: String,
    pub display_name: String,
    pub priority: Priority,
    pub status: CheckStatus,
    pub is_site_wide: bool,
    /// Page URLs the finding was recorded for (empty for site-wide findings)
    pub urls: Vec<String>,
    pub fix_guidance: Option<String>,
    pub learn_more_url: String,
}

/// Everything the report shows
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub audit: AuditRecord,
    pub stats: PageStatistics,
    pub failed: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl AuditReport {
    /// Loads the report of `audit_id` from storage
    pub fn load<S: Storage>(storage: &S, audit_id: i64) -> StorageResult<Self> {
        let audit = storage.get_audit(audit_id)?;
        let pages = storage.list_pages(audit_id)?;
        let results = storage.list_check_results(audit_id)?;

        let urls: HashMap<i64, &str> = pages.iter().map(|p| (p.id, p.url.as_str())).collect();

        Ok(Self {
            stats: PageStatistics::from_pages(&pages),
            failed: group_findings(&results, CheckStatus::Failed, &urls),
            warnings: group_findings(&results, CheckStatus::Warning, &urls),
            audit,
        })
    }
}

/// Groups results with `status` by rule, highest priority first
fn group_findings(
    results: &[CheckResultRecord],
    status: CheckStatus,
    urls: &HashMap<i64, &str>,
) -> Vec<Finding> {
    let mut by_rule: BTreeMap<&str, Finding> = BTreeMap::new();

    for result in results.iter().filter(|r| r.status == status) {
        let finding = by_rule
            .entry(result.rule_name.as_str())
            .or_insert_with(|| Finding {
                rule_name: result.rule_name.clone(),
                display_name: result.display_name.clone(),
                priority: result.priority,
                status,
                is_site_wide: result.is_site_wide,
                urls: Vec::new(),
                fix_guidance: result.fix_guidance.clone(),
                learn_more_url: result.learn_more_url.clone(),
            });

        if let Some(url) = result.page_id.and_then(|id| urls.get(&id)) {
            finding.urls.push(url.to_string());
        }
    }

    let mut findings: Vec<Finding> = by_rule.into_values().collect();
    findings.sort_by(|a, b| {
        b.priority
            .weight()
            .cmp(&a.priority.weight())
            .then(b.urls.len().cmp(&a.urls.len()))
    });
    findings
}

/// Formats a report as plain text
pub fn format_report(report: &AuditReport) -> String {
    let audit = &report.audit;
    let mut out = String::new();

    out.push_str(&format!("=== Audit {}: {} ===\n\n", audit.id, audit.root_url));
    out.push_str(&format!("Status:    {}\n", audit.status));
    if let Some(started) = &audit.started_at {
        out.push_str(&format!("Started:   {}\n", started));
    }
    if let Some(completed) = &audit.completed_at {
        out.push_str(&format!("Finished:  {}\n", completed));
    }
    out.push_str(&format!("Batches:   {}\n", audit.current_batch));
    if audit.relaxed_tls {
        out.push_str("TLS:       certificate errors ignored\n");
    }
    if let Some(error) = &audit.error_message {
        out.push_str(&format!("Error:     {}\n", error));
    }
    out.push('\n');

    match audit.score_card() {
        Some(scores) => {
            out.push_str("Scores:\n");
            out.push_str(&format!("  Overall:       {:>3}/100\n", scores.overall));
            out.push_str(&format!("  SEO:           {:>3}/100\n", scores.seo));
            out.push_str(&format!("  AI readiness:  {:>3}/100\n", scores.ai_readiness));
            out.push_str(&format!("  Technical:     {:>3}/100\n", scores.technical));
            out.push_str(&format!(
                "Checks: {} failed, {} warnings, {} passed\n\n",
                scores.failed_count, scores.warning_count, scores.passed_count
            ));
        }
        None => out.push_str("Scores: not available yet\n\n"),
    }

    let stats = &report.stats;
    out.push_str("Pages:\n");
    out.push_str(&format!(
        "  Crawled:       {} ({} fetched, {} unreachable)\n",
        stats.total, stats.fetched, stats.unreachable
    ));
    out.push_str(&format!("  Error pages:   {}\n", stats.error_pages));
    if !stats.resources.is_empty() {
        let kinds: Vec<String> = stats
            .resources
            .iter()
            .map(|(kind, count)| format!("{} {}", kind, count))
            .collect();
        out.push_str(&format!(
            "  Resources:     {} ({})\n",
            stats.resource_count(),
            kinds.join(", ")
        ));
    }
    out.push_str(&format!("  Discovered:    {}\n\n", audit.urls_discovered));

    if let Some(summary) = &audit.summary {
        out.push_str("Summary:\n");
        for line in summary.lines() {
            out.push_str(&format!("  {}\n", line));
        }
        out.push('\n');
    }

    push_findings(&mut out, "Failed", &report.failed);
    push_findings(&mut out, "Warnings", &report.warnings);

    out
}

fn push_findings(out: &mut String, heading: &str, findings: &[Finding]) {
    if findings.is_empty() {
        return;
    }

    out.push_str(&format!("{} ({}):\n", heading, findings.len()));
    for finding in findings {
        let scope = if finding.is_site_wide {
            "site-wide".to_string()
        } else if finding.urls.len() == 1 {
            "1 page".to_string()
        } else {
            format!("{} pages", finding.urls.len())
        };
        out.push_str(&format!(
            "  [{}] {} ({})\n",
            finding.priority.to_db_string(),
            finding.display_name,
            scope
        ));

        for url in finding.urls.iter().take(MAX_URLS_PER_FINDING) {
            out.push_str(&format!("      {}\n", url));
        }
        if finding.urls.len() > MAX_URLS_PER_FINDING {
            out.push_str(&format!(
                "      ... and {} more\n",
                finding.urls.len() - MAX_URLS_PER_FINDING
            ));
        }

        if let Some(fix) = &finding.fix_guidance {
            out.push_str(&format!("      Fix: {}\n", fix));
        }
        if !finding.learn_more_url.is_empty() {
            out.push_str(&format!("      See: {}\n", finding.learn_more_url));
        }
    }
    out.push('\n');
}

/// Writes a formatted report to `path`
pub fn write_report(report: &AuditReport, path: &Path) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(format_report(report).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Rule, Verdict};
    use crate::scoring;
    use crate::state::AuditStatus;
    use crate::storage::{NewPage, SqliteStorage};

    fn setup() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let audit_id = storage.create_audit("https://x.test/", None).unwrap();
        storage.start_audit(audit_id).unwrap();
        (storage, audit_id)
    }

    fn add_page(storage: &mut SqliteStorage, audit_id: i64, url: &str) -> i64 {
        storage
            .insert_page(
                audit_id,
                &NewPage {
                    url: url.to_string(),
                    status_code: Some(200),
                    ..NewPage::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn test_findings_grouped_by_rule() {
        let (mut storage, audit_id) = setup();
        let home = add_page(&mut storage, audit_id, "https://x.test/");
        let about = add_page(&mut storage, audit_id, "https://x.test/about");

        let missing_title =
            Verdict::failed(serde_json::Value::Null).into_result(Rule::MissingTitle);
        let thin = Verdict::warning(serde_json::Value::Null).into_result(Rule::ThinContent);
        storage
            .insert_check_results(audit_id, Some(home), &[missing_title.clone(), thin])
            .unwrap();
        storage
            .insert_check_results(audit_id, Some(about), &[missing_title])
            .unwrap();
        let robots = Verdict::failed(serde_json::Value::Null).into_result(Rule::RobotsTxt);
        storage
            .insert_check_results(audit_id, None, &[robots])
            .unwrap();

        let report = AuditReport::load(&storage, audit_id).unwrap();

        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].rule_name, "missing_title");
        assert_eq!(
            report.failed[0].urls,
            vec!["https://x.test/".to_string(), "https://x.test/about".to_string()]
        );
        assert!(report.failed[1].is_site_wide);
        assert!(report.failed[1].urls.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.stats.fetched, 2);
    }

    #[test]
    fn test_format_running_audit() {
        let (storage, audit_id) = setup();
        let report = AuditReport::load(&storage, audit_id).unwrap();
        let text = format_report(&report);

        assert!(text.contains("=== Audit 1: https://x.test/ ==="));
        assert!(text.contains("Status:    crawling"));
        assert!(text.contains("Scores: not available yet"));
        assert!(!text.contains("Failed ("));
    }

    #[test]
    fn test_format_finished_audit() {
        let (mut storage, audit_id) = setup();
        let home = add_page(&mut storage, audit_id, "https://x.test/");
        let result = Verdict::failed(serde_json::Value::Null).into_result(Rule::MissingH1);
        storage
            .insert_check_results(audit_id, Some(home), &[result])
            .unwrap();

        let results = storage.list_check_results(audit_id).unwrap();
        storage
            .save_scores(audit_id, &scoring::score(&results))
            .unwrap();
        storage.set_summary(audit_id, "Add an H1.").unwrap();
        storage
            .finish_audit(audit_id, AuditStatus::Completed, None)
            .unwrap();

        let text = format_report(&AuditReport::load(&storage, audit_id).unwrap());

        assert!(text.contains("Status:    completed"));
        assert!(text.contains("Technical:       0/100"));
        assert!(text.contains("Checks: 1 failed, 0 warnings, 0 passed"));
        assert!(text.contains("  Add an H1.\n"));
        assert!(text.contains("[critical]"));
        assert!(text.contains("(1 page)"));
        assert!(text.contains("      https://x.test/\n"));
    }

    #[test]
    fn test_write_report() {
        let (storage, audit_id) = setup();
        let report = AuditReport::load(&storage, audit_id).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        write_report(&report, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, format_report(&report));
    }
}
