//! Scoring engine
//!
//! Turns a set of check verdicts into category scores and an overall score.
//! Scoring is a pure function of the persisted check results, so a finished
//! audit can always be re-scored from the database.
//!
//! # Weights
//!
//! | Priority | Weight |
//! |----------|--------|
//! | critical | 3 |
//! | recommended | 2 |
//! | optional | 1 |
//!
//! A passed check earns its full weight, a warning earns half, a failure
//! earns nothing.

use crate::state::{Category, CheckStatus, Priority};
use crate::storage::CheckResultRecord;

/// Scores and status tallies of an audit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard {
    pub overall: u32,
    pub seo: u32,
    pub ai_readiness: u32,
    pub technical: u32,
    pub failed_count: u32,
    pub warning_count: u32,
    pub passed_count: u32,
}

impl ScoreCard {
    /// Returns the score of one category
    pub fn category(&self, category: Category) -> u32 {
        match category {
            Category::Seo => self.seo,
            Category::AiReadiness => self.ai_readiness,
            Category::Technical => self.technical,
        }
    }

    /// Total number of scored results
    pub fn total_count(&self) -> u32 {
        self.failed_count + self.warning_count + self.passed_count
    }
}

/// Earned and available points of one category, in half-weight units
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    earned: u32,
    total: u32,
}

impl Tally {
    fn add(&mut self, priority: Priority, status: CheckStatus) {
        let weight = priority.weight() * 2;
        self.total += weight;
        self.earned += match status {
            CheckStatus::Passed => weight,
            CheckStatus::Warning => weight / 2,
            CheckStatus::Failed => 0,
        };
    }

    /// Empty categories pass vacuously
    fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (self.earned as f64 / self.total as f64 * 100.0).round() as u32
    }
}

/// Scores raw `(category, priority, status)` verdicts
pub fn score_verdicts<I>(verdicts: I) -> ScoreCard
where
    I: IntoIterator<Item = (Category, Priority, CheckStatus)>,
{
    let mut seo = Tally::default();
    let mut ai_readiness = Tally::default();
    let mut technical = Tally::default();
    let (mut failed_count, mut warning_count, mut passed_count) = (0, 0, 0);

    for (category, priority, status) in verdicts {
        let tally = match category {
            Category::Seo => &mut seo,
            Category::AiReadiness => &mut ai_readiness,
            Category::Technical => &mut technical,
        };
        tally.add(priority, status);

        match status {
            CheckStatus::Passed => passed_count += 1,
            CheckStatus::Warning => warning_count += 1,
            CheckStatus::Failed => failed_count += 1,
        }
    }

    let seo = seo.percentage();
    let ai_readiness = ai_readiness.percentage();
    let technical = technical.percentage();
    let overall = ((seo + ai_readiness + technical) as f64 / 3.0).round() as u32;

    ScoreCard {
        overall,
        seo,
        ai_readiness,
        technical,
        failed_count,
        warning_count,
        passed_count,
    }
}

/// Scores the persisted check results of an audit
pub fn score(results: &[CheckResultRecord]) -> ScoreCard {
    score_verdicts(
        results
            .iter()
            .map(|result| (result.category, result.priority, result.status)),
    )
}
