//! Reconcile and preview commands for tcdedup.
//!
//! Both cluster stored records by SimHash distance. `preview` only reports
//! the clusters; `reconcile` keeps one record per cluster and removes the
//! rest.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::ProjectScope;
use crate::dedup::{ClusterAudit, DuplicateCluster, Reconciler};
use crate::storage::RecordStore;

/// Options shared by the reconcile and preview commands.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Project to reconcile, or every project.
    pub scope: ProjectScope,
    /// Maximum Hamming distance; the configured threshold when unset.
    pub threshold: Option<u32>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            json: false,
            quiet: false,
            scope: ProjectScope::All,
            threshold: None,
        }
    }
}

/// Output format for the reconcile command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileOutput {
    /// Whether reconciliation completed.
    pub success: bool,
    /// Scope that was reconciled.
    pub scope: String,
    /// Hamming threshold used.
    pub threshold: u32,
    pub total_cases: usize,
    pub duplicate_groups: usize,
    pub cases_removed: usize,
    pub cases_merged: usize,
    pub details: Vec<ClusterAudit>,
    /// Error message if reconciliation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconcileOutput {
    /// Create a failed output.
    pub fn failure(scope: &ProjectScope, threshold: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            scope: scope.to_string(),
            threshold,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Reconcile failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        if self.duplicate_groups == 0 {
            return format!(
                "No duplicates found among {} record(s) in {} (threshold {}).\n",
                self.total_cases, self.scope, self.threshold
            );
        }

        let mut lines = vec![format!(
            "Reconciled {} (threshold {}): {} group(s), {} removed, {} merged, {} record(s) scanned\n",
            self.scope,
            self.threshold,
            self.duplicate_groups,
            self.cases_removed,
            self.cases_merged,
            self.total_cases
        )];
        for audit in &self.details {
            lines.push(format!("Kept {} \"{}\"", audit.keep_id, audit.keep_title));
            for (id, title) in audit.removed_ids.iter().zip(&audit.removed_titles) {
                let merged = if audit.merged_ids.contains(id) {
                    " (merged)"
                } else {
                    ""
                };
                lines.push(format!("  - removed {} \"{}\"{}", id, title, merged));
            }
            lines.push(format!("  Reason: {}", audit.reason));
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

/// Output format for the preview command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewOutput {
    /// Whether clustering completed.
    pub success: bool,
    pub scope: String,
    pub threshold: u32,
    pub duplicate_groups: Vec<DuplicateCluster>,
    pub total_would_remove: usize,
    /// Error message if clustering failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewOutput {
    /// Create a failed output.
    pub fn failure(scope: &ProjectScope, threshold: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            scope: scope.to_string(),
            threshold,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Format output as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Preview failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        if self.duplicate_groups.is_empty() {
            return format!(
                "No duplicate groups in {} (threshold {}).\n",
                self.scope, self.threshold
            );
        }

        let mut lines = vec![format!(
            "{} duplicate group(s) in {}, {} record(s) would be removed:\n",
            self.duplicate_groups.len(),
            self.scope,
            self.total_would_remove
        )];
        for (i, cluster) in self.duplicate_groups.iter().enumerate() {
            let module = if cluster.module.is_empty() {
                "(no module)"
            } else {
                cluster.module.as_str()
            };
            lines.push(format!("{}. [{}] keep {}", i + 1, module, cluster.keep_id));
            lines.push(format!("   remove: {}", cluster.remove_ids.join(", ")));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// The reconcile and preview command implementation.
pub struct ReconcileCommand<S: RecordStore> {
    reconciler: Reconciler<S>,
    default_threshold: u32,
}

impl<S: RecordStore> ReconcileCommand<S> {
    /// Create a new reconcile command.
    pub fn new(store: S, config: Config) -> Self {
        let default_threshold = config.simhash.hamming_threshold;
        Self {
            reconciler: Reconciler::new(store, config),
            default_threshold,
        }
    }

    fn threshold(&self, options: &ReconcileOptions) -> u32 {
        options.threshold.unwrap_or(self.default_threshold)
    }

    /// Run reconciliation.
    pub fn run(&self, options: &ReconcileOptions) -> ReconcileOutput {
        let threshold = self.threshold(options);
        match self.reconciler.reconcile(&options.scope, threshold) {
            Ok(summary) => ReconcileOutput {
                success: true,
                scope: options.scope.to_string(),
                threshold,
                total_cases: summary.total_cases,
                duplicate_groups: summary.duplicate_groups,
                cases_removed: summary.cases_removed,
                cases_merged: summary.cases_merged,
                details: summary.details,
                error: None,
            },
            Err(e) => ReconcileOutput::failure(&options.scope, threshold, e.to_string()),
        }
    }

    /// Report clusters without changing the store.
    pub fn preview(&self, options: &ReconcileOptions) -> PreviewOutput {
        let threshold = self.threshold(options);
        match self.reconciler.preview_reconcile(&options.scope, threshold) {
            Ok(preview) => PreviewOutput {
                success: true,
                scope: options.scope.to_string(),
                threshold,
                duplicate_groups: preview.duplicate_groups,
                total_would_remove: preview.total_would_remove,
                error: None,
            },
            Err(e) => PreviewOutput::failure(&options.scope, threshold, e.to_string()),
        }
    }

    /// Format reconcile output based on options.
    pub fn format_output(&self, output: &ReconcileOutput, options: &ReconcileOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }

    /// Format preview output based on options.
    pub fn format_preview(&self, output: &PreviewOutput, options: &ReconcileOptions) -> String {
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
