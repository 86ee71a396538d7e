//! Integration tests for the audit engine
//!
//! These tests use wiremock to serve a small site and drive audits through
//! the orchestrator end-to-end, one batch at a time or to completion.

use site_auditor::audit::SummaryGenerator;
use site_auditor::config::{AuditorConfig, Config, OutputConfig, SummaryConfig, UserAgentConfig};
use site_auditor::scoring;
use site_auditor::storage::{SqliteStorage, Storage};
use site_auditor::url::ResourceType;
use site_auditor::{AuditStatus, BatchOutcome, CheckStatus, Orchestrator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration
fn create_test_config(batch_size: u32, db_path: &str) -> Config {
    Config {
        auditor: AuditorConfig {
            batch_size,
            batch_time_budget: 60,
            request_delay: 0,
            request_timeout: 5,
            aux_timeout: 2,
            max_pages: None,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestAuditor".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        summary: None,
    }
}

fn in_memory(config: &Config) -> Orchestrator<SqliteStorage> {
    let storage = SqliteStorage::new_in_memory().expect("in-memory database");
    Orchestrator::new(storage, config).expect("orchestrator")
}

/// A well-formed page linking to `links`
fn page_html(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    format!(
        r#"<html lang="en"><head><title>{title}</title>
        <meta name="viewport" content="width=device-width, initial-scale=1">
        <meta name="description" content="Description of {title}">
        </head><body><h1>{title}</h1><p>Some text.</p>{anchors}</body></html>"#
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Root linking to /a and /b; /a links to /a/deep, /b links to /c
async fn mount_small_site(server: &MockServer) {
    mount_page(server, "/", page_html("Home", &["/a", "/b", "/"])).await;
    mount_page(server, "/a", page_html("Page A", &["/a/deep", "/b"])).await;
    mount_page(server, "/b", page_html("Page B", &["/c", "/a#section"])).await;
    mount_page(server, "/a/deep", page_html("Deep", &["/"])).await;
    mount_page(server, "/c", page_html("Page C", &[])).await;
}

fn root_of(server: &MockServer) -> String {
    format!("{}/", server.uri())
}

fn page_urls<S: Storage>(storage: &S, audit_id: i64) -> Vec<String> {
    storage
        .list_pages(audit_id)
        .unwrap()
        .into_iter()
        .map(|p| p.url)
        .collect()
}

#[tokio::test]
async fn test_full_audit_single_batch() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();

    let outcome = orchestrator.run_batch(audit_id).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Finished(AuditStatus::Completed));

    let storage = orchestrator.storage();
    let audit = storage.get_audit(audit_id).unwrap();
    assert_eq!(audit.status, AuditStatus::Completed);
    assert_eq!(audit.pages_crawled, 5);
    assert_eq!(audit.urls_discovered, 5);
    assert_eq!(audit.current_batch, 1);
    assert!(audit.started_at.is_some());
    assert!(audit.completed_at.is_some());
    assert!(audit.homepage_html.is_some());

    // Site-wide checks ran exactly once
    assert_eq!(storage.count_site_wide_results(audit_id).unwrap(), 6);

    // Persisted scores are reproducible from persisted results
    let results = storage.list_check_results(audit_id).unwrap();
    let rescored = scoring::score(&results);
    assert_eq!(audit.score_card(), Some(rescored));
}

#[tokio::test]
async fn test_breadth_first_order_and_deduplication() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let base = server.uri();
    assert_eq!(
        page_urls(orchestrator.storage(), audit_id),
        vec![
            format!("{}/", base),
            format!("{}/a", base),
            format!("{}/b", base),
            format!("{}/a/deep", base),
            format!("{}/c", base),
        ]
    );

    let queue = orchestrator.storage().list_queue(audit_id).unwrap();
    let depths: Vec<u32> = queue.iter().map(|e| e.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 2, 2]);
    assert!(queue.iter().all(|e| e.crawled_at.is_some()));
}

#[tokio::test]
async fn test_resumes_across_batches_and_processes() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("audit.db");
    let db_path = db_path.to_str().unwrap();
    let config = create_test_config(2, db_path);

    // First invocation: two pages, then yield
    let audit_id = {
        let storage = SqliteStorage::new(std::path::Path::new(db_path)).unwrap();
        let mut orchestrator = Orchestrator::new(storage, &config).unwrap();
        let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();

        let outcome = orchestrator.run_batch(audit_id).await.unwrap();
        assert_eq!(outcome, BatchOutcome::Yielded);

        let audit = orchestrator.storage().get_audit(audit_id).unwrap();
        assert_eq!(audit.status, AuditStatus::BatchComplete);
        assert_eq!(audit.pages_crawled, 2);
        assert!(audit.overall_score.is_none());
        assert_eq!(orchestrator.storage().count_site_wide_results(audit_id).unwrap(), 0);
        audit_id
    };

    // Later invocations reopen the database, as a fresh process would
    let storage = SqliteStorage::new(std::path::Path::new(db_path)).unwrap();
    let mut orchestrator = Orchestrator::new(storage, &config).unwrap();

    let mut batches = 1;
    loop {
        batches += 1;
        match orchestrator.run_batch(audit_id).await.unwrap() {
            BatchOutcome::Yielded => continue,
            BatchOutcome::Finished(status) => {
                assert_eq!(status, AuditStatus::Completed);
                break;
            }
        }
    }

    let audit = orchestrator.storage().get_audit(audit_id).unwrap();
    assert_eq!(audit.current_batch, batches);
    assert_eq!(audit.pages_crawled, 5);

    let mut urls = page_urls(orchestrator.storage(), audit_id);
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 5);
    assert_eq!(orchestrator.storage().count_site_wide_results(audit_id).unwrap(), 6);
}

#[tokio::test]
async fn test_resources_are_probed_not_checked() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        page_html("Home", &["/report.pdf", "/files/archive.zip"]),
    )
    .await;

    Mock::given(method("HEAD"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let storage = orchestrator.storage();
    let pdf = storage
        .get_page_by_url(audit_id, &format!("{}/report.pdf", server.uri()))
        .unwrap()
        .expect("pdf recorded");
    assert!(pdf.is_resource);
    assert_eq!(pdf.resource_type, Some(ResourceType::Pdf));
    assert_eq!(pdf.status_code, Some(200));
    assert_eq!(pdf.last_modified.as_deref(), Some("2015-10-21T07:28:00Z"));

    let zip = storage
        .get_page_by_url(audit_id, &format!("{}/files/archive.zip", server.uri()))
        .unwrap()
        .expect("zip recorded");
    assert_eq!(zip.resource_type, Some(ResourceType::Archive));

    let results = storage.list_check_results(audit_id).unwrap();
    assert!(results
        .iter()
        .all(|r| r.page_id != Some(pdf.id) && r.page_id != Some(zip.id)));
}

#[tokio::test]
async fn test_error_page_gets_only_status_check() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page_html("Home", &["/missing"])).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<a href=\"/hidden\">x</a>"))
        .mount(&server)
        .await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let storage = orchestrator.storage();
    let missing = storage
        .get_page_by_url(audit_id, &format!("{}/missing", server.uri()))
        .unwrap()
        .expect("error page recorded");
    assert_eq!(missing.status_code, Some(404));
    assert!(missing.title.is_none());

    let results: Vec<_> = storage
        .list_check_results(audit_id)
        .unwrap()
        .into_iter()
        .filter(|r| r.page_id == Some(missing.id))
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rule_name, "http_status");
    assert_eq!(results[0].status, CheckStatus::Failed);

    // Links on error pages are not followed
    assert_eq!(storage.count_pages(audit_id).unwrap(), 2);
}

#[tokio::test]
async fn test_stop_request_finalizes_as_stopped() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let config = create_test_config(1, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();

    assert_eq!(
        orchestrator.run_batch(audit_id).await.unwrap(),
        BatchOutcome::Yielded
    );
    assert!(orchestrator.request_stop(audit_id).unwrap());

    let outcome = orchestrator.run_batch(audit_id).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Finished(AuditStatus::Stopped));

    let audit = orchestrator.storage().get_audit(audit_id).unwrap();
    assert_eq!(audit.status, AuditStatus::Stopped);
    assert_eq!(audit.pages_crawled, 1);
    assert!(audit.overall_score.is_some());
    assert!(audit.error_message.is_none());
    assert_eq!(orchestrator.storage().count_site_wide_results(audit_id).unwrap(), 6);

    // Terminal audits never change again
    let again = orchestrator.run_batch(audit_id).await.unwrap();
    assert_eq!(again, BatchOutcome::Finished(AuditStatus::Stopped));
    assert_eq!(orchestrator.storage().count_site_wide_results(audit_id).unwrap(), 6);
    assert!(!orchestrator.request_stop(audit_id).unwrap());
}

#[tokio::test]
async fn test_dismissals_skip_page_and_site_rules() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body><p>No heading here</p></body></html>"#.to_string(),
    )
    .await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let root = root_of(&server);

    orchestrator
        .storage_mut()
        .add_dismissal(7, "missing_h1", &root, None)
        .unwrap();
    orchestrator
        .storage_mut()
        .add_dismissal(7, "robots_txt", &server.uri(), None)
        .unwrap();

    let audit_id = orchestrator.create_audit(&root, Some(7)).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let names: Vec<String> = orchestrator
        .storage()
        .list_check_results(audit_id)
        .unwrap()
        .into_iter()
        .map(|r| r.rule_name)
        .collect();
    assert!(!names.contains(&"missing_h1".to_string()));
    assert!(!names.contains(&"robots_txt".to_string()));
    assert!(names.contains(&"missing_title".to_string()));
    assert!(names.contains(&"sitemap_xml".to_string()));
}

#[tokio::test]
async fn test_page_cap_finalizes_early() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let mut config = create_test_config(50, ":memory:");
    config.auditor.max_pages = Some(2);
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();

    let status = orchestrator.run_to_completion(audit_id).await.unwrap();
    assert_eq!(status, AuditStatus::Completed);
    assert_eq!(orchestrator.storage().count_pages(audit_id).unwrap(), 2);
    assert!(orchestrator.storage().count_pending(audit_id).unwrap() > 0);
}

#[tokio::test]
async fn test_summary_is_stored_when_available() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page_html("Home", &[])).await;
    Mock::given(method("POST"))
        .and(path("/summarize"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "summary": "Looks healthy." })),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(50, ":memory:");
    config.summary = Some(SummaryConfig {
        endpoint: format!("{}/summarize", server.uri()),
        timeout: 5,
    });
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let audit = orchestrator.storage().get_audit(audit_id).unwrap();
    assert_eq!(audit.summary.as_deref(), Some("Looks healthy."));
}

#[tokio::test]
async fn test_summary_failure_does_not_fail_audit() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page_html("Home", &[])).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = create_test_config(50, ":memory:");
    let generator = SummaryGenerator::from_config(Some(&SummaryConfig {
        endpoint: format!("{}/summarize", server.uri()),
        timeout: 5,
    }))
    .unwrap();
    let mut orchestrator = in_memory(&config).with_summary_generator(generator);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();

    let status = orchestrator.run_to_completion(audit_id).await.unwrap();
    assert_eq!(status, AuditStatus::Completed);
    assert!(orchestrator.storage().get_audit(audit_id).unwrap().summary.is_none());
}

#[tokio::test]
async fn test_internal_redirect_chain_reported() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page_html("Home", &["/old"])).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/mid"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mid"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/new", page_html("New", &[])).await;

    let config = create_test_config(50, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    orchestrator.run_to_completion(audit_id).await.unwrap();

    let storage = orchestrator.storage();
    let old = storage
        .get_page_by_url(audit_id, &format!("{}/old", server.uri()))
        .unwrap()
        .expect("redirected page recorded");
    assert_eq!(old.status_code, Some(200));
    assert_eq!(old.title.as_deref(), Some("New"));
    assert_eq!(
        old.redirects,
        vec![format!("{}/mid", server.uri()), format!("{}/new", server.uri())]
    );

    let chains = storage
        .list_check_results(audit_id)
        .unwrap()
        .into_iter()
        .find(|r| r.rule_name == "redirect_chains")
        .expect("redirect check recorded");
    assert_eq!(chains.status, CheckStatus::Warning);
    assert_eq!(chains.detail["chains"][0]["start"], format!("{}/old", server.uri()));
    assert_eq!(
        chains.detail["chains"][0]["hops"].as_array().unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_batched_run_scores_like_single_run() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let mut single = in_memory(&create_test_config(50, ":memory:"));
    let single_id = single.create_audit(&root_of(&server), None).unwrap();
    assert_eq!(
        single.run_batch(single_id).await.unwrap(),
        BatchOutcome::Finished(AuditStatus::Completed)
    );

    let mut batched = in_memory(&create_test_config(2, ":memory:"));
    let batched_id = batched.create_audit(&root_of(&server), None).unwrap();
    assert_eq!(
        batched.run_to_completion(batched_id).await.unwrap(),
        AuditStatus::Completed
    );

    let single_audit = single.storage().get_audit(single_id).unwrap();
    let batched_audit = batched.storage().get_audit(batched_id).unwrap();
    assert!(batched_audit.current_batch > 1);
    assert!(single_audit.score_card().is_some());
    assert_eq!(single_audit.score_card(), batched_audit.score_card());
}

#[tokio::test]
async fn test_claimed_entry_without_page_is_dropped() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page_html("Home", &["/a", "/b"])).await;
    mount_page(&server, "/b", page_html("Page B", &[])).await;
    // The process died while fetching /a: it was claimed but never recorded
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html("Page A", &[])))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(1, ":memory:");
    let mut orchestrator = in_memory(&config);
    let audit_id = orchestrator.create_audit(&root_of(&server), None).unwrap();
    assert_eq!(
        orchestrator.run_batch(audit_id).await.unwrap(),
        BatchOutcome::Yielded
    );

    let claimed = orchestrator
        .storage_mut()
        .claim_next(audit_id)
        .unwrap()
        .expect("pending entry");
    assert_eq!(claimed.url, format!("{}/a", server.uri()));

    let status = orchestrator.run_to_completion(audit_id).await.unwrap();
    assert_eq!(status, AuditStatus::Completed);

    let storage = orchestrator.storage();
    assert!(storage.get_page_by_url(audit_id, &claimed.url).unwrap().is_none());
    assert_eq!(
        page_urls(storage, audit_id),
        vec![root_of(&server), format!("{}/b", server.uri())]
    );
    assert_eq!(storage.count_pending(audit_id).unwrap(), 0);
}
