//! Output module for audit reports
//!
//! This module handles:
//! - Page statistics derived from the crawled page set
//! - The plain-text report printed by `show` (or written to a file)

mod report;
pub mod stats;

pub use report::{format_report, write_report, AuditReport, Finding};
pub use stats::PageStatistics;
