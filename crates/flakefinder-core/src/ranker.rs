//! Relevance ranking: most suspicious tests first.

use std::collections::BTreeMap;

use crate::model::ReportMatrix;
use crate::severity::SeverityTier;

/// Cells per ranked tier, most severe tier first.
pub type SeverityVector = [u32; SeverityTier::RANKED.len()];

/// A test name with its severity occurrence vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTest {
    pub name: String,
    pub severities: SeverityVector,
}

/// Count a test's cells per tier. `Unimportant` cells are not counted.
pub fn severity_vector(tiers: impl IntoIterator<Item = SeverityTier>) -> SeverityVector {
    let mut vector = [0; SeverityTier::RANKED.len()];
    for tier in tiers {
        if let Some(i) = tier.rank_index() {
            vector[i] += 1;
        }
    }
    vector
}

/// Rank every test in the matrix.
pub fn rank(matrix: &ReportMatrix) -> Vec<String> {
    rank_with(matrix, std::iter::empty::<&str>())
}

/// Rank the matrix's tests plus `candidates`, which may be missing from
/// the matrix and then rank with an all-zero vector.
pub fn rank_with<'a>(
    matrix: &ReportMatrix,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    ranked_tests(matrix, candidates)
        .into_iter()
        .map(|t| t.name)
        .collect()
}

/// Ranking with the vectors that produced it.
pub fn ranked_tests<'a>(
    matrix: &ReportMatrix,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Vec<RankedTest> {
    let mut vectors: BTreeMap<String, SeverityVector> = matrix
        .iter()
        .map(|(name, lanes)| {
            let vector = severity_vector(lanes.values().map(|cell| cell.severity()));
            (name.to_string(), vector)
        })
        .collect();
    for name in candidates {
        vectors.entry(name.to_string()).or_default();
    }

    let mut ranked: Vec<RankedTest> = vectors
        .into_iter()
        .map(|(name, severities)| RankedTest { name, severities })
        .collect();
    ranked.sort_by(|a, b| {
        b.severities
            .cmp(&a.severities)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestOutcome;
    use SeverityTier::*;

    /// Matrix whose cells classify to the given tiers.
    fn matrix(rows: &[(&str, &[SeverityTier])]) -> ReportMatrix {
        let mut matrix = ReportMatrix::new();
        for (test, tiers) in rows {
            for (i, tier) in tiers.iter().enumerate() {
                let lane = format!("lane-{i}");
                let cell = matrix.cell_mut(test, &lane);
                let (failed, succeeded) = match tier {
                    HeavilyFlaky => (1, 0),
                    MostlyFlaky => (1, 2),
                    ModeratelyFlaky => (1, 5),
                    MildlyFlaky => (1, 10),
                    Fine | Unimportant => (0, 1),
                };
                for _ in 0..failed {
                    cell.record(TestOutcome::Failed, 1, 0, &lane);
                }
                for _ in 0..succeeded {
                    cell.record(TestOutcome::Passed, 1, 0, &lane);
                }
                if *tier == Unimportant {
                    cell.exclude();
                }
                assert_eq!(cell.severity(), *tier);
            }
        }
        matrix
    }

    #[test]
    fn candidates_missing_from_matrix_rank_last() {
        let data = matrix(&[("t3", &[HeavilyFlaky])]);
        assert_eq!(rank_with(&data, ["t1", "t2", "t3"]), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn no_duplicates_when_test_spans_lanes() {
        let data = matrix(&[
            ("t1", &[MostlyFlaky, Unimportant]),
            ("t2", &[MildlyFlaky, Unimportant]),
            ("t3", &[HeavilyFlaky]),
        ]);
        assert_eq!(rank_with(&data, ["t1", "t2", "t3"]), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn sorted_descending_by_severity() {
        let data = matrix(&[
            ("t1", &[MostlyFlaky]),
            ("t2", &[MildlyFlaky]),
            ("t3", &[HeavilyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn same_top_severity_sorted_by_lower_tiers() {
        let data = matrix(&[
            ("t1", &[HeavilyFlaky, MostlyFlaky]),
            ("t2", &[HeavilyFlaky, MildlyFlaky]),
            ("t3", &[HeavilyFlaky, HeavilyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn count_at_top_tier_wins() {
        let data = matrix(&[
            ("t1", &[HeavilyFlaky, HeavilyFlaky]),
            ("t2", &[HeavilyFlaky]),
            ("t3", &[HeavilyFlaky, HeavilyFlaky, HeavilyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn full_ties_sort_alphabetically() {
        let data = matrix(&[
            ("tb", &[HeavilyFlaky, HeavilyFlaky]),
            ("tc", &[HeavilyFlaky, HeavilyFlaky]),
            ("ta", &[HeavilyFlaky, HeavilyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["ta", "tb", "tc"]);
    }

    #[test]
    fn zero_gaps_between_tiers_cascade() {
        let data = matrix(&[
            ("tb", &[HeavilyFlaky, MildlyFlaky]),
            ("tc", &[HeavilyFlaky]),
            ("ta", &[HeavilyFlaky, MildlyFlaky, MildlyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["ta", "tb", "tc"]);

        let data = matrix(&[
            ("tb", &[HeavilyFlaky, ModeratelyFlaky]),
            ("ta", &[HeavilyFlaky, MildlyFlaky, MildlyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["tb", "ta"]);
    }

    #[test]
    fn heavily_flaky_beats_many_mostly_flaky() {
        let data = matrix(&[
            ("a-mostly", &[MostlyFlaky, MostlyFlaky, MostlyFlaky]),
            ("z-heavy", &[HeavilyFlaky]),
        ]);
        assert_eq!(rank(&data), vec!["z-heavy", "a-mostly"]);
    }

    #[test]
    fn unimportant_only_tests_sort_last() {
        let data = matrix(&[("a", &[Unimportant]), ("b", &[Fine])]);
        let ranked = ranked_tests(&data, std::iter::empty());
        assert_eq!(ranked[0].name, "b");
        assert_eq!(ranked[1].name, "a");
        assert_eq!(ranked[1].severities, [0, 0, 0, 0, 0]);
    }

    #[test]
    fn ranking_is_repeatable() {
        let data = matrix(&[
            ("t1", &[MostlyFlaky, Fine]),
            ("t2", &[MostlyFlaky, Fine]),
            ("t3", &[ModeratelyFlaky]),
        ]);
        let first = rank(&data);
        assert_eq!(first, rank(&data));
        assert_eq!(first, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn vector_ignores_unimportant() {
        let v = severity_vector([HeavilyFlaky, Unimportant, Fine, HeavilyFlaky]);
        assert_eq!(v, [2, 0, 0, 0, 1]);
    }
}
