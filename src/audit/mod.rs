//! Audit lifecycle driver
//!
//! # Components
//!
//! - `Orchestrator`: Runs one time-boxed batch of an audit and finalizes it
//!   once the crawl is over
//! - `SummaryGenerator`: Optional narrative summary from an external service
//! - `AuditFailure`: The human-readable reason persisted on a failed audit

mod orchestrator;
mod summary;

pub use orchestrator::Orchestrator;
pub use summary::{AuditFacts, SummaryError, SummaryGenerator};

use crate::state::AuditStatus;
use std::fmt;

/// What one `run_batch` invocation left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The budget was hit with work pending; invoke again
    Yielded,
    /// The audit reached a terminal state
    Finished(AuditStatus),
}

impl BatchOutcome {
    pub fn needs_another_batch(&self) -> bool {
        matches!(self, Self::Yielded)
    }
}

/// Reason an audit ended in `failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFailure {
    /// No page could ever be fetched
    Unreachable,
    /// A stop was requested before the first page was fetched
    StoppedBeforeFirstPage,
    /// Anything else that aborted a batch
    Internal(String),
}

impl fmt::Display for AuditFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(
                f,
                "The site could not be reached or blocked every request; no page was crawled"
            ),
            Self::StoppedBeforeFirstPage => {
                write!(f, "The audit was stopped before any page was crawled")
            }
            Self::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}
