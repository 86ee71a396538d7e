/// Audit lifecycle states
///
/// This module defines every state an audit moves through, from creation to
/// one of the three terminal outcomes.
use std::fmt;

/// Represents the current lifecycle state of an audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditStatus {
    // ===== Active States =====
    /// Audit has been created but no batch has run yet
    Pending,

    /// A batch is currently crawling pages
    Crawling,

    /// The last batch hit its budget with work remaining
    BatchComplete,

    /// Crawling is over; site-wide checks and scoring are running
    Checking,

    /// An operator asked for the audit to stop; polled by the orchestrator
    StopRequested,

    // ===== Terminal States =====
    /// All work finished and scores were computed
    Completed,

    /// The audit could not produce any result
    Failed,

    /// The audit was stopped by the user and finalized with partial results
    Stopped,
}

impl AuditStatus {
    /// Returns true if this is a terminal state (never changes again)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if the scheduler should invoke another batch
    pub fn needs_batch(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the transition `self -> to` is part of the lifecycle
    ///
    /// `Crawling -> Crawling` and `Checking -> Checking` are allowed so that a
    /// batch interrupted by a crash can be resumed.
    pub fn can_transition_to(&self, to: AuditStatus) -> bool {
        use AuditStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, to) {
            (_, Failed) => true,
            (_, StopRequested) => true,
            (Pending, Crawling) => true,
            (Crawling, Crawling | BatchComplete | Checking | Stopped) => true,
            (BatchComplete, Crawling | Checking) => true,
            (Checking, Checking | Completed | Stopped) => true,
            (StopRequested, Stopped) => true,
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Crawling => "crawling",
            Self::BatchComplete => "batch_complete",
            Self::Checking => "checking",
            Self::StopRequested => "stop_requested",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "crawling" => Some(Self::Crawling),
            "batch_complete" => Some(Self::BatchComplete),
            "checking" => Some(Self::Checking),
            "stop_requested" => Some(Self::StopRequested),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Returns all possible audit statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Crawling,
            Self::BatchComplete,
            Self::Checking,
            Self::StopRequested,
            Self::Completed,
            Self::Failed,
            Self::Stopped,
        ]
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
