//! State module for audit lifecycle and verdict vocabulary
//!
//! # Components
//!
//! - `AuditStatus`: The lifecycle of an audit (pending, crawling, checking, terminal states)
//! - `CheckStatus`, `Priority`, `Category`: The vocabulary of a single check result

mod audit_status;
mod verdict;

// Re-export main types
pub use audit_status::AuditStatus;
pub use verdict::{Category, CheckStatus, Priority};
