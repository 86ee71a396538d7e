//! Configuration module for Site-Auditor
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use site_auditor::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("auditor.toml")).unwrap();
//! println!("Pages per batch: {}", config.auditor.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{AuditorConfig, Config, OutputConfig, SummaryConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
