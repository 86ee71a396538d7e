//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page content
//! - HEAD requests to probe downloadable resources
//! - Relaxed TLS fallback for hosts with broken certificates
//! - Redirects followed hop by hop, so every page keeps its chain
//! - Last-Modified normalization

use crate::config::UserAgentConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, redirect::Policy, Client, Response};
use std::error::Error as _;
use std::time::Duration;
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
///
/// A non-2xx answer is still a `Success`: the status code is recorded and
/// interpreted by the caller.
#[derive(Debug)]
pub enum FetchResult {
    /// The server answered
    Success {
        /// Final URL after redirects
        final_url: String,
        /// Every redirect hop followed, in order
        redirects: Vec<String>,
        /// HTTP status code
        status_code: u16,
        /// Page body content (empty for HEAD probes)
        body: String,
        /// Last-Modified header as RFC 3339, if present and parseable
        last_modified: Option<String>,
        /// Whether the answer came through the relaxed TLS client
        used_relaxed_tls: bool,
    },

    /// Network error (DNS, connection refused, timeout, certificate rejected)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. } => Some(*status_code),
            Self::NetworkError { .. } => None,
        }
    }

    pub fn redirects(&self) -> &[String] {
        match self {
            Self::Success { redirects, .. } => redirects,
            Self::NetworkError { .. } => &[],
        }
    }

    pub fn used_relaxed_tls(&self) -> bool {
        matches!(
            self,
            Self::Success {
                used_relaxed_tls: true,
                ..
            }
        )
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total timeout of one request
/// * `relaxed_tls` - Accept invalid certificates
/// * `follow_redirects` - Follow up to ten redirects, or hand 3xx answers back
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use site_auditor::config::UserAgentConfig;
/// use site_auditor::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SiteAuditor".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30), false, true).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
    relaxed_tls: bool,
    follow_redirects: bool,
) -> Result<Client, reqwest::Error> {
    let redirect = if follow_redirects {
        Policy::limited(MAX_REDIRECTS)
    } else {
        Policy::none()
    };

    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect)
        .danger_accept_invalid_certs(relaxed_tls)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Clients sharing one identity, per TLS mode and redirect policy
#[derive(Debug, Clone)]
pub struct Fetcher {
    strict: Client,
    relaxed: Client,
    strict_manual: Client,
    relaxed_manual: Client,
}

impl Fetcher {
    pub fn new(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            strict: build_http_client(config, timeout, false, true)?,
            relaxed: build_http_client(config, timeout, true, true)?,
            strict_manual: build_http_client(config, timeout, false, false)?,
            relaxed_manual: build_http_client(config, timeout, true, false)?,
        })
    }

    /// Returns the client matching the audit's TLS mode
    pub fn client(&self, relaxed_tls: bool) -> &Client {
        if relaxed_tls {
            &self.relaxed
        } else {
            &self.strict
        }
    }

    /// Same as [`Fetcher::client`] but redirects are not followed
    pub fn manual_redirect_client(&self, relaxed_tls: bool) -> &Client {
        if relaxed_tls {
            &self.relaxed_manual
        } else {
            &self.strict_manual
        }
    }

    /// Fetches a page with GET
    ///
    /// # Request Flow
    ///
    /// 1. Send GET with the non-following client matching `relaxed_tls`
    /// 2. On a certificate error in strict mode, retry once with the relaxed
    ///    client and report `used_relaxed_tls` so the caller can persist it
    /// 3. Follow each 3xx `Location` by hand, at most ten times, recording
    ///    every hop
    /// 4. Read the body; a body read failure is a network error
    pub async fn fetch(&self, url: &str, relaxed_tls: bool) -> FetchResult {
        self.send(url, relaxed_tls, true).await
    }

    /// Probes a downloadable resource with HEAD (status and Last-Modified only)
    pub async fn probe(&self, url: &str, relaxed_tls: bool) -> FetchResult {
        self.send(url, relaxed_tls, false).await
    }

    async fn send(&self, url: &str, relaxed_tls: bool, with_body: bool) -> FetchResult {
        let mut current = match Url::parse(url) {
            Ok(current) => current,
            Err(e) => {
                return FetchResult::NetworkError {
                    error: format!("Invalid URL: {}", e),
                }
            }
        };
        let mut relaxed = relaxed_tls;
        let mut redirects = Vec::new();

        loop {
            let response = match self.send_once(&current, &mut relaxed, with_body).await {
                Ok(response) => response,
                Err(e) => return network_error(current.as_str(), &e),
            };

            if !response.status().is_redirection() {
                return into_result(response, redirects, relaxed, with_body).await;
            }

            // A 3xx without a usable Location is the final answer
            let Some(next) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| current.join(location).ok())
            else {
                return into_result(response, redirects, relaxed, with_body).await;
            };

            if redirects.len() >= MAX_REDIRECTS {
                tracing::debug!("Fetch of {} failed: too many redirects", url);
                return FetchResult::NetworkError {
                    error: "Too many redirects".to_string(),
                };
            }

            redirects.push(next.to_string());
            current = next;
        }
    }

    /// Sends one request without following redirects
    ///
    /// Switches `relaxed` on when a certificate error forced the relaxed retry.
    async fn send_once(
        &self,
        url: &Url,
        relaxed: &mut bool,
        with_body: bool,
    ) -> Result<Response, reqwest::Error> {
        let request = |client: &Client| {
            if with_body {
                client.get(url.as_str())
            } else {
                client.head(url.as_str())
            }
        };

        match request(self.manual_redirect_client(*relaxed)).send().await {
            Err(e) if !*relaxed && is_certificate_error(&e) => {
                tracing::info!("Certificate rejected for {}, retrying with relaxed TLS", url);
                let response = request(&self.relaxed_manual).send().await?;
                *relaxed = true;
                Ok(response)
            }
            result => result,
        }
    }
}

async fn into_result(
    response: Response,
    redirects: Vec<String>,
    used_relaxed_tls: bool,
    with_body: bool,
) -> FetchResult {
    let final_url = response.url().to_string();
    let status_code = response.status().as_u16();
    let last_modified = response
        .headers()
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_last_modified);

    let body = if with_body {
        match response.text().await {
            Ok(body) => body,
            Err(e) => return network_error(&final_url, &e),
        }
    } else {
        String::new()
    };

    FetchResult::Success {
        final_url,
        redirects,
        status_code,
        body,
        last_modified,
        used_relaxed_tls,
    }
}

fn network_error(url: &str, error: &reqwest::Error) -> FetchResult {
    let error = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() && !is_certificate_error(error) {
        "Connection refused".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else {
        error_chain(error)
    };

    tracing::debug!("Fetch of {} failed: {}", url, error);
    FetchResult::NetworkError { error }
}

/// Joins an error and its sources into one message
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Returns true if the request failed because the certificate was rejected
///
/// Other handshake failures (protocol versions, cipher suites) are not
/// fixed by skipping verification and stay network errors.
fn is_certificate_error(error: &reqwest::Error) -> bool {
    certificate_rejected(&error_chain(error))
}

fn certificate_rejected(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("certificate") || message.contains("unknownissuer")
}

/// Normalizes an HTTP date (RFC 2822 style) to RFC 3339 UTC
pub fn parse_last_modified(value: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
}
