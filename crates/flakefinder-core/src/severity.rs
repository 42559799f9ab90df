//! Severity tiers and the classifier deriving them from cell counters.

use serde::{Deserialize, Serialize};

use crate::model::TestOutcome;

/// How unstable a test is in one lane.
///
/// Variants are declared least severe first so the derived ordering reads
/// naturally: `HeavilyFlaky > MostlyFlaky > … > Unimportant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    /// Excluded from ranking by the caller; never produced by [`classify`].
    Unimportant,
    Fine,
    MildlyFlaky,
    ModeratelyFlaky,
    MostlyFlaky,
    HeavilyFlaky,
}

impl SeverityTier {
    /// Tiers that take part in ranking, most severe first.
    pub const RANKED: [SeverityTier; 5] = [
        SeverityTier::HeavilyFlaky,
        SeverityTier::MostlyFlaky,
        SeverityTier::ModeratelyFlaky,
        SeverityTier::MildlyFlaky,
        SeverityTier::Fine,
    ];

    /// Position in [`Self::RANKED`], `None` for `Unimportant`.
    pub fn rank_index(self) -> Option<usize> {
        match self {
            Self::HeavilyFlaky => Some(0),
            Self::MostlyFlaky => Some(1),
            Self::ModeratelyFlaky => Some(2),
            Self::MildlyFlaky => Some(3),
            Self::Fine => Some(4),
            Self::Unimportant => None,
        }
    }

    /// CSS class used by the HTML report.
    pub fn css_class(self) -> &'static str {
        match self {
            Self::HeavilyFlaky => "red",
            Self::MostlyFlaky => "orange",
            Self::ModeratelyFlaky => "yellow",
            Self::MildlyFlaky => "almostgreen",
            Self::Fine => "green",
            Self::Unimportant => "unimportant",
        }
    }

    /// Severity of a single observed outcome.
    pub fn for_outcome(outcome: TestOutcome) -> Self {
        match outcome {
            TestOutcome::Failed => Self::HeavilyFlaky,
            TestOutcome::Passed => Self::Fine,
            TestOutcome::Skipped => Self::Unimportant,
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::HeavilyFlaky => "heavily flaky",
            Self::MostlyFlaky => "mostly flaky",
            Self::ModeratelyFlaky => "moderately flaky",
            Self::MildlyFlaky => "mildly flaky",
            Self::Fine => "fine",
            Self::Unimportant => "unimportant",
        };
        f.write_str(label)
    }
}

/// Classify a cell from its failed and succeeded counters.
///
/// Skips never influence the tier. The ratio `succeeded / failed` is
/// compared with integer arithmetic.
pub fn classify(failed: u64, succeeded: u64) -> SeverityTier {
    if failed == 0 {
        return SeverityTier::Fine;
    }
    if succeeded == 0 {
        return SeverityTier::HeavilyFlaky;
    }

    let within = |factor: u64| succeeded <= failed.saturating_mul(factor);
    if within(1) {
        SeverityTier::HeavilyFlaky
    } else if within(2) {
        SeverityTier::MostlyFlaky
    } else if within(5) {
        SeverityTier::ModeratelyFlaky
    } else if within(10) {
        SeverityTier::MildlyFlaky
    } else {
        SeverityTier::Fine
    }
}
