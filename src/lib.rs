//! Site-Auditor: a resumable crawl-and-audit engine
//!
//! This crate crawls a website breadth-first from a root URL, evaluates every
//! page (and the site as a whole) against a catalog of inspection rules, and
//! produces a weighted quality score. Work is split into time-boxed batches so
//! an external scheduler can drive an audit to completion across invocations.

pub mod audit;
pub mod checks;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod scoring;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Auditor operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid audit transition: {from} -> {to}")]
    InvalidTransition {
        from: state::AuditStatus,
        to: state::AuditStatus,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Site-Auditor operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use audit::{BatchOutcome, Orchestrator};
pub use config::Config;
pub use state::{AuditStatus, Category, CheckStatus, Priority};
pub use self::url::{classify_resource, normalize_url, ResourceKind};
