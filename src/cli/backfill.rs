//! Backfill command for tcdedup.
//!
//! Computes fingerprints and SimHash for stored records that predate them.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::dedup::Reconciler;
use crate::storage::RecordStore;

/// Options for the backfill command.
#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the backfill command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillOutput {
    /// Whether the backfill completed.
    pub success: bool,
    /// Records that received new metadata.
    pub updated: usize,
    /// Error message if the backfill failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackfillOutput {
    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Backfill failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        match self.updated {
            0 => "All records already have dedup metadata.\n".to_string(),
            n => format!("Backfilled dedup metadata for {} record(s).\n", n),
        }
    }
}

/// The backfill command implementation.
pub struct BackfillCommand<S: RecordStore> {
    reconciler: Reconciler<S>,
}

impl<S: RecordStore> BackfillCommand<S> {
    /// Create a new backfill command.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            reconciler: Reconciler::new(store, config),
        }
    }

    /// Run the backfill command.
    pub fn run(&self, _options: &BackfillOptions) -> BackfillOutput {
        match self.reconciler.backfill_simhash() {
            Ok(summary) => BackfillOutput {
                success: true,
                updated: summary.updated,
                error: None,
            },
            Err(e) => BackfillOutput {
                success: false,
                updated: 0,
                error: Some(e.to_string()),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &BackfillOutput, options: &BackfillOptions) -> String {
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
    use crate::core::{ProjectScope, Session, TestCaseRecord};
    use crate::storage::MemoryRecordStore;
    use std::sync::Arc;

    #[test]
    fn test_backfill_fills_missing_metadata() {
        let store = Arc::new(MemoryRecordStore::with_sessions(vec![Session::new(
            "s-1", "shop",
        )
        .with_cases(vec![
            TestCaseRecord::new("Valid login", "Login").with_id("a"),
            TestCaseRecord::new("Logout", "Login").with_id("b"),
        ])]));
        let cmd = BackfillCommand::new(Arc::clone(&store), Config::default());

        let output = cmd.run(&BackfillOptions::default());
        assert!(output.success);
        assert_eq!(output.updated, 2);
        assert!(output.format_text().contains("2 record(s)"));

        let sessions = store.read_all(&ProjectScope::All).unwrap();
        assert!(sessions[0].test_cases.iter().all(|r| r.dedup.is_complete()));

        let again = cmd.run(&BackfillOptions::default());
        assert_eq!(again.updated, 0);
        assert!(again.format_text().starts_with("All records already"));
    }

    #[test]
    fn test_json_output() {
        let cmd = BackfillCommand::new(MemoryRecordStore::new(), Config::default());
        let options = BackfillOptions {
            json: true,
            quiet: false,
        };
        let output = cmd.run(&options);
        let parsed: serde_json::Value =
            serde_json::from_str(&cmd.format_output(&output, &options)).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["updated"], 0);
    }
}
