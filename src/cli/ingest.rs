//! Ingest command for tcdedup.
//!
//! Runs a JSON file of generated records through the dedup pipeline and
//! stores the survivors in a project.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::input::read_records;
use crate::config::Config;
use crate::dedup::{IngestOptions, IngestSummary, Ingestor, PendingReview};
use crate::storage::RecordStore;

/// Options for the ingest command.
#[derive(Debug, Clone, Default)]
pub struct IngestCommandOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Target project.
    pub project_id: String,
    /// Display name stored on new records.
    pub project_name: Option<String>,
    /// Generator that produced the batch.
    pub model: Option<String>,
    /// Source documents the batch came from.
    pub documents: Vec<String>,
    /// Append to this session instead of starting a new one.
    pub session_id: Option<String>,
}

impl IngestCommandOptions {
    fn to_ingest_options(&self) -> IngestOptions {
        IngestOptions {
            project_id: self.project_id.clone(),
            project_name: self.project_name.clone().unwrap_or_default(),
            document_names: self.documents.clone(),
            model: self.model.clone().unwrap_or_default(),
            continue_session_id: self.session_id.clone(),
        }
    }
}

/// Output format for the ingest command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOutput {
    /// Whether the batch was processed.
    pub success: bool,
    /// Records read from the input file, including rejected ones.
    pub received: usize,
    /// Input elements that could not be read as a record.
    #[serde(default)]
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<IngestSummary>,
    /// Error message if ingest failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestOutput {
    /// Create a successful output.
    pub fn success(received: usize, summary: IngestSummary) -> Self {
        Self {
            success: true,
            received,
            rejected: 0,
            summary: Some(summary),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// The ingest command implementation.
pub struct IngestCommand<S: RecordStore> {
    ingestor: Ingestor<S>,
}

impl<S: RecordStore> IngestCommand<S> {
    /// Create a new ingest command.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            ingestor: Ingestor::new(store, config),
        }
    }

    /// Run the ingest command.
    pub fn run(&self, input: &Path, options: &IngestCommandOptions) -> IngestOutput {
        let parsed = match read_records(input) {
            Ok(parsed) => parsed,
            Err(e) => return IngestOutput::failure(e.to_string()),
        };
        let received = parsed.total();
        let rejected = parsed.rejected;

        match self
            .ingestor
            .ingest(parsed.records, &options.to_ingest_options())
        {
            Ok(mut summary) => {
                summary.skipped += rejected;
                IngestOutput {
                    rejected,
                    ..IngestOutput::success(received, summary)
                }
            }
            Err(e) => IngestOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &IngestOutput, options: &IngestCommandOptions) -> String {
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

impl IngestOutput {
    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Ingest failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        let Some(summary) = &self.summary else {
            return "Nothing ingested.\n".to_string();
        };

        let mut lines = Vec::new();
        lines.push(format!(
            "Ingested {} record(s) into session {}",
            self.received,
            if summary.session_id.is_empty() {
                "(none)"
            } else {
                summary.session_id.as_str()
            }
        ));
        lines.push(format!("  Saved:             {}", summary.saved));
        lines.push(format!("  Exact duplicates:  {}", summary.exact_duplicates));
        lines.push(format!("  Auto-merged:       {}", summary.auto_merged));
        lines.push(format!("  Needs review:      {}", summary.review_required));
        if self.rejected > 0 {
            lines.push(format!(
                "  Skipped:           {} ({} unreadable)",
                summary.skipped, self.rejected
            ));
        } else {
            lines.push(format!("  Skipped:           {}", summary.skipped));
        }
        if summary.legacy_matches > 0 {
            lines.push(format!("  Legacy matches:    {}", summary.legacy_matches));
        }
        if summary.safety_valve_triggered {
            lines.push(String::new());
            lines.push(
                "Warning: duplicate rate too high, dedup was bypassed and all records were saved."
                    .to_string(),
            );
        }

        if !summary.merge_conflicts.is_empty() {
            lines.push(String::new());
            lines.push("Pending review:".to_string());
            for review in &summary.merge_conflicts {
                lines.push(format_review(review));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

fn format_review(review: &PendingReview) -> String {
    format!(
        "  {:.2} [{}] \"{}\" ~ {} \"{}\"",
        review.score, review.action, review.incoming.title, review.existing.id, review.existing.title
    )
}
