//! Inspection commands for tcdedup.
//!
//! `similar` scores a candidate record against a stored project and
//! `fingerprint` prints the identity metadata the engine would compute for
//! each record in a file. Neither modifies the store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::input::{read_record, read_records};
use crate::config::Config;
use crate::core::{ProjectScope, TestCaseRecord};
use crate::dedup::fingerprint::{compute_metadata, legacy_signature};
use crate::dedup::{find_similar, recommended_action, RecommendedAction};
use crate::storage::RecordStore;

/// Options for the similar command.
#[derive(Debug, Clone, Default)]
pub struct SimilarOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Project to search.
    pub project_id: String,
    /// Minimum score; the configured `find_min` when unset.
    pub min_similarity: Option<f64>,
    /// Maximum number of matches.
    pub limit: Option<usize>,
}

/// One stored record that scored above the minimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: String,
    pub title: String,
    pub module: String,
    pub score: f64,
    pub title_similarity: f64,
    pub steps_similarity: f64,
    pub module_similarity: f64,
    pub action: RecommendedAction,
}

/// Output format for the similar command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarOutput {
    /// Whether the search ran.
    pub success: bool,
    /// Title of the candidate record.
    pub title: String,
    pub min_similarity: f64,
    pub matches: Vec<MatchInfo>,
    /// Error message if the search failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimilarOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Similar failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        if self.matches.is_empty() {
            return format!(
                "No records similar to \"{}\" (min {:.2}).\n",
                self.title, self.min_similarity
            );
        }

        let mut lines = vec![format!(
            "Found {} record(s) similar to \"{}\":\n",
            self.matches.len(),
            self.title
        )];
        for (i, m) in self.matches.iter().enumerate() {
            lines.push(format!(
                "{}. {:.3} [{}] {} \"{}\"",
                i + 1,
                m.score,
                m.action,
                m.id,
                m.title
            ));
            lines.push(format!(
                "   title {:.2} | steps {:.2} | module {:.2}",
                m.title_similarity, m.steps_similarity, m.module_similarity
            ));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// The similar command implementation.
pub struct SimilarCommand<S: RecordStore> {
    store: S,
    config: Config,
}

impl<S: RecordStore> SimilarCommand<S> {
    /// Create a new similar command.
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    /// Run the similar command against the first record in `input`.
    pub fn run(&self, input: &Path, options: &SimilarOptions) -> SimilarOutput {
        match read_record(input) {
            Ok(candidate) => self.search(&candidate, options),
            Err(e) => SimilarOutput::failure(e.to_string()),
        }
    }

    /// Score one candidate against the project.
    pub fn search(&self, candidate: &TestCaseRecord, options: &SimilarOptions) -> SimilarOutput {
        let min_similarity = options
            .min_similarity
            .unwrap_or(self.config.similarity.find_min);
        let scope = ProjectScope::Project(options.project_id.clone());
        let sessions = match self.store.read_all(&scope) {
            Ok(sessions) => sessions,
            Err(e) => return SimilarOutput::failure(e.to_string()),
        };

        let thresholds = self.config.similarity.thresholds();
        let stored = sessions.iter().flat_map(|s| s.test_cases.iter());
        let mut matches: Vec<MatchInfo> = find_similar(candidate, stored, min_similarity)
            .into_iter()
            .map(|m| MatchInfo {
                id: m.record.id.clone(),
                title: m.record.title.clone(),
                module: m.record.module.clone(),
                score: m.similarity.score,
                title_similarity: m.similarity.title_similarity,
                steps_similarity: m.similarity.steps_similarity,
                module_similarity: m.similarity.module_similarity,
                action: recommended_action(m.similarity.score, &thresholds),
            })
            .collect();

        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }

        SimilarOutput {
            success: true,
            title: candidate.title.clone(),
            min_similarity,
            matches,
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SimilarOutput, options: &SimilarOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }
}

// =============================================================================
// Fingerprint
// =============================================================================

/// Options for the fingerprint command.
#[derive(Debug, Clone, Default)]
pub struct FingerprintOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Identity metadata for one input record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintInfo {
    pub title: String,
    pub fingerprint: String,
    pub loose_fingerprint: String,
    pub simhash: String,
    pub legacy_signature: String,
}

/// Output format for the fingerprint command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintOutput {
    /// Whether the input was read.
    pub success: bool,
    pub records: Vec<FingerprintInfo>,
    /// Error message if reading failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FingerprintOutput {
    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Fingerprint failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        if self.records.is_empty() {
            return "No records in input.\n".to_string();
        }

        let mut lines = Vec::new();
        for info in &self.records {
            lines.push(format!("\"{}\"", info.title));
            lines.push(format!("  fingerprint:       {}", info.fingerprint));
            lines.push(format!("  loose fingerprint: {}", info.loose_fingerprint));
            lines.push(format!("  simhash:           {}", info.simhash));
            lines.push(format!("  legacy signature:  {}", info.legacy_signature));
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

/// The fingerprint command implementation.
pub struct FingerprintCommand {
    simhash_bits: usize,
}

impl FingerprintCommand {
    /// Create a new fingerprint command.
    pub fn new(config: &Config) -> Self {
        Self {
            simhash_bits: config.simhash.bits,
        }
    }

    /// Run the fingerprint command.
    pub fn run(&self, input: &Path, _options: &FingerprintOptions) -> FingerprintOutput {
        let records = match read_records(input) {
            Ok(parsed) => parsed.records,
            Err(e) => {
                return FingerprintOutput {
                    success: false,
                    records: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        FingerprintOutput {
            success: true,
            records: records.iter().map(|r| self.describe(r)).collect(),
            error: None,
        }
    }

    fn describe(&self, record: &TestCaseRecord) -> FingerprintInfo {
        let metadata = compute_metadata(record, self.simhash_bits);
        FingerprintInfo {
            title: record.title.clone(),
            fingerprint: metadata.fingerprint.unwrap_or_default(),
            loose_fingerprint: metadata.loose_fingerprint.unwrap_or_default(),
            simhash: metadata.simhash.unwrap_or_default(),
            legacy_signature: legacy_signature(record),
        }
    }

    /// Format output based on options.
    pub fn format_output(
        &self,
        output: &FingerprintOutput,
        options: &FingerprintOptions,
    ) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Session;
    use crate::storage::MemoryRecordStore;
    use std::fs;
    use tempfile::TempDir;

    fn login() -> TestCaseRecord {
        TestCaseRecord::new("Valid login", "Login")
            .with_actions(["Enter user", "Enter pass", "Click Login"])
            .with_expected("Redirect to dashboard")
    }

    fn store() -> MemoryRecordStore {
        MemoryRecordStore::with_sessions(vec![Session::new("s-1", "shop").with_cases(vec![
            login().with_id("r1"),
            TestCaseRecord::new("Export invoices as PDF", "Billing")
                .with_id("r2")
                .with_actions(["Open billing history", "Press export"]),
        ])])
    }

    fn options() -> SimilarOptions {
        SimilarOptions {
            project_id: "shop".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_similar_finds_identical_record() {
        let cmd = SimilarCommand::new(store(), Config::default());
        let output = cmd.search(&login(), &options());

        assert!(output.success);
        assert_eq!(output.min_similarity, 0.7);
        assert_eq!(output.matches.len(), 1);
        assert_eq!(output.matches[0].id, "r1");
        assert!((output.matches[0].score - 1.0).abs() < 1e-9);
        assert_eq!(output.matches[0].action, RecommendedAction::AutoMerge);
    }

    #[test]
    fn test_similar_respects_min_and_limit() {
        let cmd = SimilarCommand::new(store(), Config::default());

        let all = cmd.search(
            &login(),
            &SimilarOptions {
                min_similarity: Some(0.0),
                ..options()
            },
        );
        assert_eq!(all.matches.len(), 2);
        assert_eq!(all.matches[0].id, "r1");

        let limited = cmd.search(
            &login(),
            &SimilarOptions {
                min_similarity: Some(0.0),
                limit: Some(1),
                ..options()
            },
        );
        assert_eq!(limited.matches.len(), 1);
    }

    #[test]
    fn test_similar_unknown_project_has_no_matches() {
        let cmd = SimilarCommand::new(store(), Config::default());
        let output = cmd.search(
            &login(),
            &SimilarOptions {
                project_id: "other".to_string(),
                ..Default::default()
            },
        );
        assert!(output.success);
        assert!(output.format_text().starts_with("No records similar"));
    }

    #[test]
    fn test_similar_reads_candidate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("candidate.json");
        fs::write(&path, serde_json::to_string(&login()).unwrap()).unwrap();

        let cmd = SimilarCommand::new(store(), Config::default());
        let output = cmd.run(&path, &options());
        assert_eq!(output.title, "Valid login");
        assert!(output.format_text().contains("r1 \"Valid login\""));
    }

    #[test]
    fn test_fingerprint_matches_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        fs::write(&path, serde_json::to_string(&vec![login()]).unwrap()).unwrap();

        let cmd = FingerprintCommand::new(&Config::default());
        let output = cmd.run(&path, &FingerprintOptions::default());

        assert!(output.success);
        let info = &output.records[0];
        assert_eq!(info.fingerprint, crate::dedup::fingerprint(&login()));
        assert_eq!(info.fingerprint.len(), 64);
        assert_eq!(info.simhash.len(), 16);
        assert!(output.format_text().contains("\"Valid login\""));
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let dir = TempDir::new().unwrap();
        let cmd = FingerprintCommand::new(&Config::default());
        let output = cmd.run(&dir.path().join("none.json"), &FingerprintOptions::default());
        assert!(!output.success);
        assert!(output.format_text().starts_with("Fingerprint failed"));
    }
}
