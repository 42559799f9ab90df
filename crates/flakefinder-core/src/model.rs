//! Data model: observations, aggregated cells and the report matrix.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FinderError, FinderResult};
use crate::severity::{classify, SeverityTier};

/// Outcome of one test case in one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

impl TestOutcome {
    /// Precedence when one build reports the same test more than once.
    fn precedence(self) -> u8 {
        match self {
            Self::Failed => 2,
            Self::Passed => 1,
            Self::Skipped => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub outcome: TestOutcome,
}

impl TestCase {
    pub fn new(name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

/// One completed build of one lane, ready to be folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildObservation {
    pub lane: String,
    pub build_number: u64,
    /// Pull request the build ran for, 0 when not PR scoped.
    pub pr_number: u64,
    pub cases: Vec<TestCase>,
    pub timestamp: DateTime<Utc>,
}

impl BuildObservation {
    /// Build an observation from every JUnit report a build published.
    ///
    /// A test reported several times contributes one outcome; failures win
    /// over passes, passes over skips.
    pub fn from_reports(
        lane: impl Into<String>,
        build_number: u64,
        pr_number: u64,
        reports: &[Vec<TestSuite>],
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut cases: Vec<TestCase> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for case in reports.iter().flatten().flat_map(|suite| &suite.cases) {
            match index.get(&case.name) {
                Some(&i) => {
                    if case.outcome.precedence() > cases[i].outcome.precedence() {
                        cases[i].outcome = case.outcome;
                    }
                }
                None => {
                    index.insert(case.name.clone(), cases.len());
                    cases.push(case.clone());
                }
            }
        }

        Self {
            lane: lane.into(),
            build_number,
            pr_number,
            cases,
            timestamp,
        }
    }
}

/// One contribution to a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(rename = "BuildNumber")]
    pub build_number: u64,
    #[serde(rename = "Severity")]
    pub severity: SeverityTier,
    #[serde(rename = "PRNumber")]
    pub pr_number: u64,
    #[serde(rename = "LaneName")]
    pub lane: String,
}

/// Aggregated results for one (test, lane) pair.
///
/// Counters only change through [`CellDetails::record`], which re-derives
/// the severity every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CellRecord")]
pub struct CellDetails {
    #[serde(rename = "Failed")]
    failed: u64,
    #[serde(rename = "Succeeded")]
    succeeded: u64,
    #[serde(rename = "Skipped")]
    skipped: u64,
    #[serde(rename = "Severity")]
    severity: SeverityTier,
    #[serde(rename = "Excluded", skip_serializing_if = "std::ops::Not::not")]
    excluded: bool,
    #[serde(rename = "Occurrences")]
    occurrences: Vec<Occurrence>,
}

impl Default for CellDetails {
    fn default() -> Self {
        Self {
            failed: 0,
            succeeded: 0,
            skipped: 0,
            severity: SeverityTier::Fine,
            excluded: false,
            occurrences: Vec::new(),
        }
    }
}

impl CellDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome and remember where it came from.
    pub fn record(&mut self, outcome: TestOutcome, build_number: u64, pr_number: u64, lane: &str) {
        match outcome {
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Passed => self.succeeded += 1,
            TestOutcome::Skipped => self.skipped += 1,
        }
        self.occurrences.push(Occurrence {
            build_number,
            severity: SeverityTier::for_outcome(outcome),
            pr_number,
            lane: lane.to_string(),
        });
        self.refresh();
    }

    /// Exclude the cell from ranking; its severity becomes `Unimportant`.
    pub fn exclude(&mut self) {
        self.excluded = true;
        self.refresh();
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn total(&self) -> u64 {
        self.failed + self.succeeded + self.skipped
    }

    pub fn severity(&self) -> SeverityTier {
        self.severity
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Newest build first, then PR, then lane.
    pub(crate) fn canonicalize_occurrences(&mut self) {
        self.occurrences.sort_by(|a, b| {
            b.build_number
                .cmp(&a.build_number)
                .then_with(|| a.pr_number.cmp(&b.pr_number))
                .then_with(|| a.lane.cmp(&b.lane))
                .then_with(|| a.severity.cmp(&b.severity))
        });
    }

    fn refresh(&mut self) {
        self.severity = if self.excluded {
            SeverityTier::Unimportant
        } else {
            classify(self.failed, self.succeeded)
        };
    }
}

#[derive(Deserialize)]
struct CellRecord {
    #[serde(rename = "Failed")]
    failed: u64,
    #[serde(rename = "Succeeded")]
    succeeded: u64,
    #[serde(rename = "Skipped")]
    skipped: u64,
    #[serde(rename = "Excluded", default)]
    excluded: bool,
    #[serde(rename = "Occurrences", default)]
    occurrences: Vec<Occurrence>,
}

impl TryFrom<CellRecord> for CellDetails {
    type Error = String;

    fn try_from(record: CellRecord) -> Result<Self, Self::Error> {
        let total = record
            .failed
            .checked_add(record.succeeded)
            .and_then(|sum| sum.checked_add(record.skipped))
            .ok_or_else(|| "cell counters overflow".to_string())?;
        if record.occurrences.len() as u64 != total {
            return Err(format!(
                "cell has {} occurrences but counters sum to {}",
                record.occurrences.len(),
                total
            ));
        }
        let mut cell = CellDetails {
            failed: record.failed,
            succeeded: record.succeeded,
            skipped: record.skipped,
            severity: SeverityTier::Fine,
            excluded: record.excluded,
            occurrences: record.occurrences,
        };
        cell.refresh();
        Ok(cell)
    }
}

/// Test name → lane name → aggregated cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportMatrix {
    tests: BTreeMap<String, BTreeMap<String, CellDetails>>,
}

impl ReportMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn get(&self, test: &str, lane: &str) -> Option<&CellDetails> {
        self.tests.get(test).and_then(|lanes| lanes.get(lane))
    }

    /// All cells of one test, keyed by lane.
    pub fn cells(&self, test: &str) -> Option<&BTreeMap<String, CellDetails>> {
        self.tests.get(test)
    }

    pub fn contains_test(&self, test: &str) -> bool {
        self.tests.contains_key(test)
    }

    pub fn test_names(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, CellDetails>)> {
        self.tests.iter().map(|(name, lanes)| (name.as_str(), lanes))
    }

    /// Every lane that contributed at least one cell, sorted.
    pub fn lanes(&self) -> Vec<String> {
        self.tests
            .values()
            .flat_map(|lanes| lanes.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tests that failed at least once in any lane, sorted by name.
    pub fn failing_tests(&self) -> Vec<String> {
        self.tests
            .iter()
            .filter(|(_, lanes)| lanes.values().any(|cell| cell.failed() > 0))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Exclude one cell from ranking. Returns false if the cell is unknown.
    pub fn exclude_cell(&mut self, test: &str, lane: &str) -> bool {
        match self.tests.get_mut(test).and_then(|lanes| lanes.get_mut(lane)) {
            Some(cell) => {
                cell.exclude();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cell_mut(&mut self, test: &str, lane: &str) -> &mut CellDetails {
        self.tests
            .entry(test.to_string())
            .or_default()
            .entry(lane.to_string())
            .or_default()
    }

    pub(crate) fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellDetails> {
        self.tests.values_mut().flat_map(|lanes| lanes.values_mut())
    }
}

/// Time range covered by one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// Window of `lookback` ending at `end`. Fails when the start would fall
    /// outside the representable time range.
    pub fn ending_at(end: DateTime<Utc>, lookback: chrono::Duration) -> FinderResult<Self> {
        let start = end
            .checked_sub_signed(lookback)
            .ok_or_else(|| FinderError::Config {
                message: format!("lookback of {lookback} reaches before the earliest date"),
            })?;
        Ok(Self { start, end })
    }

    /// Window of `lookback` ending now.
    pub fn until_now(lookback: chrono::Duration) -> FinderResult<Self> {
        Self::ending_at(Utc::now(), lookback)
    }

    pub fn lookback(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Whether something that happened at `at` belongs to the report.
    pub fn includes(&self, at: DateTime<Utc>) -> bool {
        at >= self.start
    }
}
