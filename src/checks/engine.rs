//! Fan-out of rules over one page, or over the whole site

use crate::checks::{
    evaluate_page, evaluate_site, Dismissals, PageContext, PageDocument, Rule, SiteContext,
};
use crate::storage::{NewCheckResult, PageRecord};
use futures::future::join_all;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Runs rules and turns their verdicts into storable results
///
/// Dismissed (rule, target) pairs are skipped before evaluation. A rule that
/// errors is logged and leaves no result behind.
pub struct CheckEngine<'a> {
    dismissals: &'a Dismissals,
    client: &'a Client,
    manual_client: &'a Client,
    aux_timeout: Duration,
}

impl<'a> CheckEngine<'a> {
    pub fn new(
        dismissals: &'a Dismissals,
        client: &'a Client,
        manual_client: &'a Client,
        aux_timeout: Duration,
    ) -> Self {
        Self {
            dismissals,
            client,
            manual_client,
            aux_timeout,
        }
    }

    /// Rules that apply to a page answering with `status_code`
    ///
    /// Error pages only get the status rule.
    pub fn rules_for_status(status_code: u16) -> &'static [Rule] {
        if status_code >= 400 {
            &[Rule::HttpStatus]
        } else {
            Rule::page_rules()
        }
    }

    /// Runs every applicable page rule concurrently
    ///
    /// # Arguments
    ///
    /// * `url` - Normalized page URL (also the dismissal target)
    /// * `html` - Raw markup of the page
    /// * `status_code` - Status the page answered with
    /// * `pages` - Pages crawled so far
    pub async fn run_page_checks(
        &self,
        url: &Url,
        html: &str,
        status_code: u16,
        pages: &[PageRecord],
    ) -> Vec<NewCheckResult> {
        let document = PageDocument::parse(html);
        let ctx = PageContext {
            url,
            document: &document,
            status_code,
            pages,
            client: self.client,
            aux_timeout: self.aux_timeout,
        };

        let rules: Vec<Rule> = Self::rules_for_status(status_code)
            .iter()
            .copied()
            .filter(|rule| !self.is_dismissed(*rule, url.as_str()))
            .collect();

        let ctx = &ctx;
        let outcomes = join_all(
            rules
                .iter()
                .map(|&rule| async move { (rule, evaluate_page(rule, ctx).await) }),
        )
        .await;

        outcomes
            .into_iter()
            .filter_map(|(rule, outcome)| match outcome {
                Ok(verdict) => Some(verdict.into_result(rule)),
                Err(e) => {
                    tracing::warn!(rule = rule.name(), url = %url, "Check failed: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Runs every site rule, one after the other
    ///
    /// # Arguments
    ///
    /// * `root` - Normalized root URL; its origin is the dismissal target
    /// * `homepage_html` - Homepage markup, if available
    /// * `pages` - The complete page set of the audit
    pub async fn run_site_checks(
        &self,
        root: &Url,
        homepage_html: Option<&str>,
        pages: &[PageRecord],
    ) -> Vec<NewCheckResult> {
        let homepage = homepage_html.map(PageDocument::parse);
        let ctx = SiteContext {
            root,
            homepage: homepage.as_ref(),
            pages,
            client: self.client,
            manual_client: self.manual_client,
            aux_timeout: self.aux_timeout,
        };

        let target = crate::url::origin_of(root);
        let mut results = Vec::new();

        for &rule in Rule::site_rules() {
            if self.is_dismissed(rule, &target) {
                continue;
            }

            match evaluate_site(rule, &ctx).await {
                Ok(verdict) => results.push(verdict.into_result(rule)),
                Err(e) => {
                    tracing::warn!(rule = rule.name(), site = %target, "Site check failed: {}", e)
                }
            }
        }

        results
    }

    fn is_dismissed(&self, rule: Rule, target: &str) -> bool {
        let dismissed = self.dismissals.is_dismissed(rule, target);
        if dismissed {
            tracing::debug!("Skipping dismissed {} for {}", rule.name(), target);
        }
        dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CheckStatus;
    use crate::storage::DismissalRecord;

    fn dismissal(rule: &str, url: &str) -> DismissalRecord {
        DismissalRecord {
            id: 1,
            tenant_id: 1,
            rule_name: rule.to_string(),
            url: url.to_string(),
            created_by: None,
            created_at: String::new(),
        }
    }

    const PAGE: &str = r#"<html lang="en"><head>
        <meta name="description" content="A meta description that is one hundred and twenty characters long, give or take a few words of padding here.">
        </head><body><h1>Hello</h1></body></html>"#;

    #[tokio::test]
    async fn test_page_checks_cover_every_rule() {
        let dismissals = Dismissals::default();
        let client = Client::new();
        let engine = CheckEngine::new(&dismissals, &client, &client, Duration::from_secs(1));
        let url = Url::parse("https://x.test/").unwrap();

        let results = engine.run_page_checks(&url, PAGE, 200, &[]).await;

        assert_eq!(results.len(), Rule::page_rules().len());
        assert!(results.iter().all(|r| !r.is_site_wide));

        let missing_title = results.iter().find(|r| r.rule_name == "missing_title").unwrap();
        assert_eq!(missing_title.status, CheckStatus::Failed);
        let missing_h1 = results.iter().find(|r| r.rule_name == "missing_h1").unwrap();
        assert_eq!(missing_h1.status, CheckStatus::Passed);
    }

    #[tokio::test]
    async fn test_error_page_only_gets_status_rule() {
        let dismissals = Dismissals::default();
        let client = Client::new();
        let engine = CheckEngine::new(&dismissals, &client, &client, Duration::from_secs(1));
        let url = Url::parse("https://x.test/gone").unwrap();

        let results = engine.run_page_checks(&url, "<h1>Not found</h1>", 404, &[]).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_name, "http_status");
        assert_eq!(results[0].status, CheckStatus::Failed);
    }

    #[tokio::test]
    async fn test_dismissed_rule_produces_no_result() {
        let dismissals = Dismissals::new(&[dismissal("missing_h1", "https://x.test/")]);
        let client = Client::new();
        let engine = CheckEngine::new(&dismissals, &client, &client, Duration::from_secs(1));

        let root = Url::parse("https://x.test/").unwrap();
        let results = engine.run_page_checks(&root, PAGE, 200, &[]).await;
        assert!(results.iter().all(|r| r.rule_name != "missing_h1"));
        assert_eq!(results.len(), Rule::page_rules().len() - 1);

        // Same rule on another page is still evaluated
        let other = Url::parse("https://x.test/about").unwrap();
        let results = engine.run_page_checks(&other, PAGE, 200, &[]).await;
        assert!(results.iter().any(|r| r.rule_name == "missing_h1"));
    }

    #[tokio::test]
    async fn test_site_dismissal_uses_origin() {
        let dismissals = Dismissals::new(&[
            dismissal("robots_txt", "http://127.0.0.1:9"),
            dismissal("sitemap_xml", "http://127.0.0.1:9"),
            dismissal("llms_txt", "http://127.0.0.1:9"),
            dismissal("redirect_chains", "http://127.0.0.1:9"),
        ]);
        let client = Client::new();
        let engine = CheckEngine::new(&dismissals, &client, &client, Duration::from_secs(1));
        let root = Url::parse("http://127.0.0.1:9/").unwrap();

        let results = engine.run_site_checks(&root, None, &[]).await;

        let names: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, vec!["duplicate_titles", "duplicate_meta_descriptions"]);
        assert!(results.iter().all(|r| r.is_site_wide && r.status == CheckStatus::Passed));
    }

    #[tokio::test]
    async fn test_erroring_rule_does_not_drop_siblings() {
        let dismissals = Dismissals::default();
        let client = Client::new();
        let engine = CheckEngine::new(&dismissals, &client, &client, Duration::from_secs(1));
        // Nothing listens here, so following redirects from the root errors out
        let root = Url::parse("http://127.0.0.1:9/").unwrap();

        let results = engine.run_site_checks(&root, None, &[]).await;

        let names: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "duplicate_titles",
                "duplicate_meta_descriptions",
                "robots_txt",
                "sitemap_xml",
                "llms_txt"
            ]
        );
        assert!(results.iter().all(|r| r.rule_name != "redirect_chains"));
    }
}
