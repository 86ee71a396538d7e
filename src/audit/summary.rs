//! Narrative summary client
//!
//! The summary comes from an external text-generation service. It is
//! optional: a failure here is logged and never fails the audit.

use crate::config::SummaryConfig;
use crate::scoring::ScoreCard;
use crate::state::CheckStatus;
use crate::storage::{AuditRecord, CheckResultRecord};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Number of distinct failing rules listed in the prompt
const MAX_FINDINGS_IN_PROMPT: usize = 10;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summary request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Summary service answered with status {0}")]
    Status(u16),

    #[error("Summary service returned an empty summary")]
    Empty,
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// Everything the prompt is built from
pub struct AuditFacts<'a> {
    pub audit: &'a AuditRecord,
    pub scores: &'a ScoreCard,
    pub results: &'a [CheckResultRecord],
}

/// Source of the narrative summary
#[derive(Debug, Clone)]
pub enum SummaryGenerator {
    /// No endpoint configured
    Disabled,
    /// POST `{"prompt": ...}`, answer `{"summary": ...}`
    Http { endpoint: String, client: Client },
}

impl SummaryGenerator {
    pub fn from_config(config: Option<&SummaryConfig>) -> Result<Self, reqwest::Error> {
        let Some(config) = config else {
            return Ok(Self::Disabled);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self::Http {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    /// Requests a summary
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Generation is disabled
    /// * `Ok(Some(text))` - The narrative
    /// * `Err(SummaryError)` - The service failed
    pub async fn generate(&self, facts: &AuditFacts<'_>) -> Result<Option<String>, SummaryError> {
        let Self::Http { endpoint, client } = self else {
            return Ok(None);
        };

        let prompt = build_prompt(facts);
        let response = client
            .post(endpoint)
            .json(&SummaryRequest { prompt: &prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SummaryError::Status(response.status().as_u16()));
        }

        let body: SummaryResponse = response.json().await?;
        let summary = body.summary.trim();
        if summary.is_empty() {
            return Err(SummaryError::Empty);
        }

        Ok(Some(summary.to_string()))
    }
}

/// Builds the prompt sent to the summary service
fn build_prompt(facts: &AuditFacts<'_>) -> String {
    let audit = facts.audit;
    let scores = facts.scores;

    let mut prompt = format!(
        "Write a short, plain-language summary of a website audit for {}.\n\
         Overall score: {}/100 (SEO {}, AI readiness {}, technical {}).\n\
         Pages crawled: {}. Checks: {} failed, {} warnings, {} passed.\n",
        audit.root_url,
        scores.overall,
        scores.seo,
        scores.ai_readiness,
        scores.technical,
        audit.pages_crawled,
        scores.failed_count,
        scores.warning_count,
        scores.passed_count,
    );

    // Failing rules, most frequent first
    let mut failing: BTreeMap<&str, usize> = BTreeMap::new();
    for result in facts
        .results
        .iter()
        .filter(|r| r.status == CheckStatus::Failed)
    {
        *failing.entry(result.display_name.as_str()).or_default() += 1;
    }
    let mut failing: Vec<_> = failing.into_iter().collect();
    failing.sort_by(|a, b| b.1.cmp(&a.1));

    if !failing.is_empty() {
        prompt.push_str("Most common problems:\n");
        for (name, count) in failing.into_iter().take(MAX_FINDINGS_IN_PROMPT) {
            prompt.push_str(&format!("- {} ({} occurrences)\n", name, count));
        }
    }

    prompt.push_str("Lead with the most important fix.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AuditStatus, Category, Priority};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn audit() -> AuditRecord {
        AuditRecord {
            id: 1,
            tenant_id: None,
            root_url: "https://x.test/".to_string(),
            status: AuditStatus::Checking,
            overall_score: None,
            seo_score: None,
            ai_readiness_score: None,
            technical_score: None,
            pages_crawled: 2,
            urls_discovered: 2,
            failed_count: 0,
            warning_count: 0,
            passed_count: 0,
            summary: None,
            error_message: None,
            relaxed_tls: false,
            current_batch: 1,
            homepage_html: None,
            started_at: None,
            completed_at: None,
            created_at: String::new(),
            archived_at: None,
        }
    }

    fn failed(display_name: &str) -> CheckResultRecord {
        CheckResultRecord {
            id: 0,
            audit_id: 1,
            page_id: Some(1),
            category: Category::Seo,
            rule_name: "missing_title".to_string(),
            priority: Priority::Critical,
            status: CheckStatus::Failed,
            detail: serde_json::Value::Null,
            display_name: display_name.to_string(),
            passed_name: String::new(),
            learn_more_url: String::new(),
            fix_guidance: None,
            is_site_wide: false,
            created_at: String::new(),
        }
    }

    fn scores() -> ScoreCard {
        ScoreCard {
            overall: 70,
            seo: 50,
            ai_readiness: 80,
            technical: 80,
            failed_count: 3,
            warning_count: 0,
            passed_count: 9,
        }
    }

    #[test]
    fn test_prompt_lists_frequent_failures_first() {
        let audit = audit();
        let scores = scores();
        let results = [
            failed("Page has no H1 heading"),
            failed("Page title is missing"),
            failed("Page title is missing"),
        ];
        let prompt = build_prompt(&AuditFacts {
            audit: &audit,
            scores: &scores,
            results: &results,
        });

        assert!(prompt.contains("https://x.test/"));
        assert!(prompt.contains("Overall score: 70/100"));
        let title = prompt.find("Page title is missing (2 occurrences)").unwrap();
        let h1 = prompt.find("Page has no H1 heading (1 occurrences)").unwrap();
        assert!(title < h1);
    }

    #[tokio::test]
    async fn test_disabled_generator() {
        let audit = audit();
        let scores = scores();
        let facts = AuditFacts {
            audit: &audit,
            scores: &scores,
            results: &[],
        };
        let generator = SummaryGenerator::from_config(None).unwrap();
        assert!(generator.generate(&facts).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_generator() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .and(body_partial_json(serde_json::json!({})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "summary": "  Fix your titles.  " })),
            )
            .mount(&server)
            .await;

        let config = SummaryConfig {
            endpoint: format!("{}/summarize", server.uri()),
            timeout: 5,
        };
        let generator = SummaryGenerator::from_config(Some(&config)).unwrap();

        let audit = audit();
        let scores = scores();
        let facts = AuditFacts {
            audit: &audit,
            scores: &scores,
            results: &[],
        };
        assert_eq!(
            generator.generate(&facts).await.unwrap(),
            Some("Fix your titles.".to_string())
        );
    }

    #[tokio::test]
    async fn test_http_generator_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = SummaryConfig {
            endpoint: server.uri(),
            timeout: 5,
        };
        let generator = SummaryGenerator::from_config(Some(&config)).unwrap();

        let audit = audit();
        let scores = scores();
        let facts = AuditFacts {
            audit: &audit,
            scores: &scores,
            results: &[],
        };
        assert!(matches!(
            generator.generate(&facts).await,
            Err(SummaryError::Status(503))
        ));
    }
}
