//! Weighted multi-field Jaccard similarity.
//!
//! Title, concatenated step actions and module are tokenized (lower-cased,
//! non-alphanumerics stripped, split on whitespace) and compared with Jaccard
//! similarity. Field scores are combined with fixed weights:
//! - Title: 0.5
//! - Steps: 0.4
//! - Module: 0.1
//!
//! The combined score maps to one of three actions through configurable
//! thresholds.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::TestCaseRecord;

/// Field weights.
pub mod weights {
    /// Weight of the title field.
    pub const TITLE: f64 = 0.5;
    /// Weight of the concatenated step actions.
    pub const STEPS: f64 = 0.4;
    /// Weight of the module field.
    pub const MODULE: f64 = 0.1;
}

/// Default minimum score for [`find_similar`].
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.7;

/// Similarity of one field pair and its contribution to the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub similarity: f64,
    pub weight: f64,
    pub weighted: f64,
}

impl FieldScore {
    fn new(similarity: f64, weight: f64) -> Self {
        Self {
            similarity,
            weight,
            weighted: similarity * weight,
        }
    }
}

/// Per-field detail behind a [`SimilarityScore`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityBreakdown {
    pub title: FieldScore,
    pub steps: FieldScore,
    pub module: FieldScore,
}

/// Result of comparing two records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Weighted score in `[0, 1]`.
    pub score: f64,
    pub title_similarity: f64,
    pub steps_similarity: f64,
    pub module_similarity: f64,
    pub breakdown: SimilarityBreakdown,
}

/// What to do with a near-duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Close enough to merge without asking.
    AutoMerge,
    /// Probably the same test; a human decides.
    ReviewMerge,
    /// Different tests.
    KeepSeparate,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::AutoMerge => write!(f, "auto_merge"),
            RecommendedAction::ReviewMerge => write!(f, "review_merge"),
            RecommendedAction::KeepSeparate => write!(f, "keep_separate"),
        }
    }
}

/// Score thresholds for the action tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionThresholds {
    /// Scores at or above this auto-merge.
    pub auto_merge: f64,
    /// Scores at or above this (and below `auto_merge`) go to review.
    pub review_merge: f64,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            auto_merge: 0.97,
            review_merge: 0.88,
        }
    }
}

/// Tokens for similarity: lower-cased words with non-alphanumerics removed.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().map(str::to_string).collect()
}

/// `|A ∩ B| / |A ∪ B|`. Two empty sets are identical (1.0).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn steps_text(record: &TestCaseRecord) -> String {
    record
        .steps
        .iter()
        .map(|s| s.action.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a record has title or step text to score. Records with neither
/// would compare as identical on empty token sets.
pub fn has_comparable_text(record: &TestCaseRecord) -> bool {
    !tokenize(&record.title).is_empty() || !tokenize(&steps_text(record)).is_empty()
}

/// Compare two records.
pub fn similarity(a: &TestCaseRecord, b: &TestCaseRecord) -> SimilarityScore {
    let title = FieldScore::new(
        jaccard(&tokenize(&a.title), &tokenize(&b.title)),
        weights::TITLE,
    );
    let steps = FieldScore::new(
        jaccard(&tokenize(&steps_text(a)), &tokenize(&steps_text(b))),
        weights::STEPS,
    );
    let module = FieldScore::new(
        jaccard(&tokenize(&a.module), &tokenize(&b.module)),
        weights::MODULE,
    );

    let score = (title.weighted + steps.weighted + module.weighted).clamp(0.0, 1.0);

    SimilarityScore {
        score,
        title_similarity: title.similarity,
        steps_similarity: steps.similarity,
        module_similarity: module.similarity,
        breakdown: SimilarityBreakdown {
            title,
            steps,
            module,
        },
    }
}

/// Map a score to an action tier.
pub fn recommended_action(score: f64, thresholds: &ActionThresholds) -> RecommendedAction {
    if score >= thresholds.auto_merge {
        RecommendedAction::AutoMerge
    } else if score >= thresholds.review_merge {
        RecommendedAction::ReviewMerge
    } else {
        RecommendedAction::KeepSeparate
    }
}

/// A candidate that scored at or above the minimum.
#[derive(Debug, Clone)]
pub struct SimilarMatch<'a> {
    /// Position of the candidate in the input sequence.
    pub index: usize,
    pub record: &'a TestCaseRecord,
    pub similarity: SimilarityScore,
}

/// Candidates scoring at least `min_similarity` against `target`, best first.
///
/// Candidates sharing the target's non-empty ID are skipped. Equal scores
/// keep candidate order.
pub fn find_similar<'a, I>(
    target: &TestCaseRecord,
    candidates: I,
    min_similarity: f64,
) -> Vec<SimilarMatch<'a>>
where
    I: IntoIterator<Item = &'a TestCaseRecord>,
{
    let mut matches: Vec<SimilarMatch<'a>> = candidates
        .into_iter()
        .enumerate()
        .filter(|(_, c)| target.id.is_empty() || c.id != target.id)
        .map(|(index, record)| SimilarMatch {
            index,
            record,
            similarity: similarity(target, record),
        })
        .filter(|m| m.similarity.score >= min_similarity)
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .score
            .partial_cmp(&a.similarity.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, module: &str, actions: &[&str]) -> TestCaseRecord {
        TestCaseRecord::new(title, module)
            .with_id(id)
            .with_actions(actions.iter().copied())
    }

    fn reset_steps() -> Vec<&'static str> {
        vec!["Open forgot password page", "Submit registered email", "Follow emailed link"]
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Click 'Log-in' button, NOW!");
        let expected: BTreeSet<String> = ["click", "login", "button", "now"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_jaccard() {
        let a = tokenize("a b c");
        let b = tokenize("b c d");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-12);
        assert_eq!(jaccard(&tokenize(""), &tokenize("")), 1.0);
        assert_eq!(jaccard(&tokenize("a"), &tokenize("")), 0.0);
    }

    #[test]
    fn test_reflexive() {
        let a = record("a", "User can reset password via email", "Auth", &reset_steps());
        let s = similarity(&a, &a);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.title_similarity, 1.0);
    }

    #[test]
    fn test_empty_records_are_identical() {
        let s = similarity(&TestCaseRecord::default(), &TestCaseRecord::default());
        assert_eq!(s.score, 1.0);
    }

    #[test]
    fn test_weights_applied() {
        let a = record("a", "alpha", "Auth", &["one"]);
        let b = record("b", "beta", "Auth", &["one"]);
        let s = similarity(&a, &b);
        assert_eq!(s.title_similarity, 0.0);
        assert!((s.score - 0.5).abs() < 1e-12);
        assert!((s.breakdown.steps.weighted - 0.4).abs() < 1e-12);
        assert!((s.breakdown.module.weighted - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_paraphrased_title_goes_to_review() {
        let a = record("a", "User can reset password via email link", "Auth", &reset_steps());
        let b = record("b", "User can reset password via email", "Auth", &reset_steps());
        let s = similarity(&a, &b);
        // title 6/7, steps and module identical
        assert!((s.score - (0.5 * 6.0 / 7.0 + 0.5)).abs() < 1e-12);
        assert_eq!(
            recommended_action(s.score, &ActionThresholds::default()),
            RecommendedAction::ReviewMerge
        );
    }

    #[test]
    fn test_literal_reset_titles_stay_separate() {
        let a = record("a", "User can reset password via email", "Auth", &reset_steps());
        let b = record("b", "User resets password using email link", "Auth", &reset_steps());
        let s = similarity(&a, &b);
        // shared title tokens: user, password, email (3 of 9)
        assert!((s.title_similarity - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.score - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(
            recommended_action(s.score, &ActionThresholds::default()),
            RecommendedAction::KeepSeparate
        );
    }

    #[test]
    fn test_has_comparable_text() {
        assert!(has_comparable_text(&record("a", "Login", "", &[])));
        assert!(has_comparable_text(&record("a", "", "", &["Click login"])));
        assert!(!has_comparable_text(&record("a", "", "Login", &[])));
        assert!(!has_comparable_text(&record("a", " !? ", "Login", &["--"])));
    }

    #[test]
    fn test_recommended_action_boundaries() {
        let t = ActionThresholds::default();
        assert_eq!(recommended_action(1.0, &t), RecommendedAction::AutoMerge);
        assert_eq!(recommended_action(0.97, &t), RecommendedAction::AutoMerge);
        assert_eq!(recommended_action(0.969, &t), RecommendedAction::ReviewMerge);
        assert_eq!(recommended_action(0.88, &t), RecommendedAction::ReviewMerge);
        assert_eq!(recommended_action(0.879, &t), RecommendedAction::KeepSeparate);

        let custom = ActionThresholds {
            auto_merge: 0.9,
            review_merge: 0.5,
        };
        assert_eq!(recommended_action(0.91, &custom), RecommendedAction::AutoMerge);
        assert_eq!(recommended_action(0.6, &custom), RecommendedAction::ReviewMerge);
    }

    #[test]
    fn test_find_similar_excludes_self_and_sorts() {
        let target = record("t", "Reset password via email", "Auth", &reset_steps());
        let candidates = vec![
            record("t", "Reset password via email", "Auth", &reset_steps()),
            record("far", "Export audit log", "Admin", &["Open reports"]),
            record("near", "Reset password via email link", "Auth", &reset_steps()),
            record("exact", "Reset password via email", "Auth", &reset_steps()),
        ];

        let matches = find_similar(&target, &candidates, DEFAULT_MIN_SIMILARITY);
        let ids: Vec<&str> = matches.iter().map(|m| m.record.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert_eq!(matches[0].index, 3);
    }

    #[test]
    fn test_find_similar_stable_ties() {
        let target = record("t", "Same", "M", &["x"]);
        let candidates = vec![
            record("first", "Same", "M", &["x"]),
            record("second", "Same", "M", &["x"]),
        ];
        let matches = find_similar(&target, &candidates, 0.5);
        assert_eq!(matches[0].record.id, "first");
        assert_eq!(matches[1].record.id, "second");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_record() -> impl Strategy<Value = TestCaseRecord> {
            (
                "[a-z ]{0,24}",
                "[a-z]{0,8}",
                prop::collection::vec("[a-z ]{1,16}", 0..4),
            )
                .prop_map(|(title, module, actions)| {
                    TestCaseRecord::new(title, module).with_actions(actions)
                })
        }

        proptest! {
            #[test]
            fn prop_similarity_symmetric(a in arb_record(), b in arb_record()) {
                let ab = similarity(&a, &b);
                let ba = similarity(&b, &a);
                prop_assert_eq!(ab.score, ba.score);
            }

            #[test]
            fn prop_similarity_reflexive(a in arb_record()) {
                prop_assert_eq!(similarity(&a, &a).score, 1.0);
            }

            #[test]
            fn prop_score_in_unit_interval(a in arb_record(), b in arb_record()) {
                let s = similarity(&a, &b).score;
                prop_assert!((0.0..=1.0).contains(&s));
            }
        }
    }
}
