use serde::Deserialize;

/// Main configuration structure for Site-Auditor
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auditor: AuditorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub summary: Option<SummaryConfig>,
}

/// Batch and crawl pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditorConfig {
    /// Maximum number of pages processed by one batch
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Wall-clock budget of one batch (seconds)
    #[serde(rename = "batch-time-budget")]
    pub batch_time_budget: u64,

    /// Fixed delay between two page fetches (milliseconds)
    #[serde(rename = "request-delay")]
    pub request_delay: u64,

    /// Timeout of a page fetch (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Timeout of an auxiliary request made by a check (seconds)
    #[serde(rename = "aux-timeout", default = "default_aux_timeout")]
    pub aux_timeout: u64,

    /// Optional cap on the number of pages crawled per audit
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_aux_timeout() -> u64 {
    5
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Narrative summary endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    /// URL accepting `{"prompt": ...}` and answering `{"summary": ...}`
    pub endpoint: String,

    /// Request timeout (seconds)
    #[serde(default = "default_summary_timeout")]
    pub timeout: u64,
}

fn default_summary_timeout() -> u64 {
    20
}
