/// Verdict vocabulary shared by checks, storage and scoring
use std::fmt;

/// Outcome of a single rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
}

impl CheckStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "warning" => Some(Self::Warning),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How much a rule matters to the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Optional,
    Recommended,
    Critical,
}

impl Priority {
    /// Scoring weight: critical=3, recommended=2, optional=1
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 3,
            Self::Recommended => 2,
            Self::Optional => 1,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "recommended" => Some(Self::Recommended),
            "optional" => Some(Self::Optional),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Scoring category a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Content and search-engine optimisation
    Seo,
    /// How well machines and language models can consume the site
    AiReadiness,
    /// Transport, markup structure and crawlability
    Technical,
}

impl Category {
    pub fn all() -> [Self; 3] {
        [Self::Seo, Self::AiReadiness, Self::Technical]
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Seo => "seo",
            Self::AiReadiness => "ai_readiness",
            Self::Technical => "technical",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "seo" => Some(Self::Seo),
            "ai_readiness" => Some(Self::AiReadiness),
            "technical" => Some(Self::Technical),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
