//! Deterministic field-level reconciliation of two records.
//!
//! `base` is the record that survives (its identity is kept); `incoming`
//! contributes whatever `base` lacks. Neither input is modified.
//!
//! Field rules:
//! - `id`, `created_at`, `created_by`: always from `base`
//! - `title`, `preconditions`, `expected_result`, `test_data`: longer wins
//! - `description`, `remarks`, `notes`: concatenated, without repeating text
//!   one side already contains
//! - `priority`, `status`: more severe rank wins, whichever side it is on
//! - `tags`: union in first-seen order
//! - `steps`: union by normalized action, base order first
//! - everything else: first non-empty side
//!
//! The merged record comes back without fingerprints or SimHash, since they
//! describe the old content; callers attach fresh metadata before storing it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::canonical::normalize;
use crate::core::{DedupMetadata, Priority, Status, Step, TestCaseRecord};

/// How a conflicting field was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    UsedIncoming,
    UsedBase,
}

/// Two differing values for the same ranked field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub field: String,
    pub base_value: String,
    pub incoming_value: String,
    pub resolution: ConflictResolution,
}

/// What the merge changed relative to `base`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeChanges {
    pub fields_modified: Vec<String>,
    pub steps_added: usize,
    pub steps_modified: usize,
    pub priority_changed: bool,
    pub status_changed: bool,
}

impl MergeChanges {
    /// True if the merged record differs from `base` in content.
    pub fn is_empty(&self) -> bool {
        self.fields_modified.is_empty()
    }

    fn touch(&mut self, field: &str) {
        if !self.fields_modified.iter().any(|f| f == field) {
            self.fields_modified.push(field.to_string());
        }
    }
}

/// Output of [`merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged_case: TestCaseRecord,
    pub changes: MergeChanges,
    pub conflicts: Vec<MergeConflict>,
}

/// Merge `incoming` into `base`, stamping `updated_at` with the current time.
pub fn merge(base: &TestCaseRecord, incoming: &TestCaseRecord) -> MergeResult {
    merge_at(base, incoming, Utc::now())
}

/// [`merge`] with an explicit clock.
pub fn merge_at(
    base: &TestCaseRecord,
    incoming: &TestCaseRecord,
    now: DateTime<Utc>,
) -> MergeResult {
    let mut changes = MergeChanges::default();
    let mut conflicts = Vec::new();

    let mut merged = base.clone();
    merged.updated_at = Some(now);
    merged.version = base.version.saturating_add(1);
    merged.dedup = DedupMetadata {
        legacy_signature: base.dedup.legacy_signature.clone(),
        ..Default::default()
    };

    // Longer text wins
    for (field, target, theirs) in [
        ("title", &mut merged.title, &incoming.title),
        ("preconditions", &mut merged.preconditions, &incoming.preconditions),
        ("expected_result", &mut merged.expected_result, &incoming.expected_result),
        ("test_data", &mut merged.test_data, &incoming.test_data),
    ] {
        if theirs.trim().chars().count() > target.trim().chars().count() {
            *target = theirs.clone();
            changes.touch(field);
        }
    }

    // Concatenated free text
    for (field, target, theirs) in [
        ("description", &mut merged.description, &incoming.description),
        ("remarks", &mut merged.remarks, &incoming.remarks),
        ("notes", &mut merged.notes, &incoming.notes),
    ] {
        let combined = concat_dedup(target, theirs);
        if combined != *target {
            *target = combined;
            changes.touch(field);
        }
    }

    // First non-empty side
    for (field, target, theirs) in [
        ("module", &mut merged.module, &incoming.module),
        ("test_type", &mut merged.test_type, &incoming.test_type),
        ("requirement_ref", &mut merged.requirement_ref, &incoming.requirement_ref),
        ("source_document", &mut merged.source_document, &incoming.source_document),
        ("project_id", &mut merged.project_id, &incoming.project_id),
        ("project_name", &mut merged.project_name, &incoming.project_name),
    ] {
        if target.trim().is_empty() && !theirs.trim().is_empty() {
            *target = theirs.clone();
            changes.touch(field);
        }
    }

    let (priority, priority_changed) = resolve_ranked(
        "priority",
        &base.priority,
        &incoming.priority,
        Priority::rank,
        Priority::as_str,
        &mut conflicts,
    );
    merged.priority = priority;
    if priority_changed {
        changes.priority_changed = true;
        changes.touch("priority");
    }

    let (status, status_changed) = resolve_ranked(
        "status",
        &base.status,
        &incoming.status,
        Status::rank,
        Status::as_str,
        &mut conflicts,
    );
    merged.status = status;
    if status_changed {
        changes.status_changed = true;
        changes.touch("status");
    }

    let tags = union_tags(&base.tags, &incoming.tags);
    if tags != base.tags {
        merged.tags = tags;
        changes.touch("tags");
    }

    let (steps, added, modified) = union_steps(&base.steps, &incoming.steps);
    merged.steps = steps;
    changes.steps_added = added;
    changes.steps_modified = modified;
    if added > 0 || modified > 0 {
        changes.touch("steps");
    }

    MergeResult {
        merged_case: merged,
        changes,
        conflicts,
    }
}

/// Whether merging `incoming` into `base` without review is safe.
///
/// Requires the same normalized module and title and, when both carry a
/// priority, ranks no more than one level apart.
pub fn is_safe_merge(base: &TestCaseRecord, incoming: &TestCaseRecord) -> bool {
    if normalize(&base.module) != normalize(&incoming.module) {
        return false;
    }
    if normalize(&base.title) != normalize(&incoming.title) {
        return false;
    }
    match (&base.priority, &incoming.priority) {
        (Some(a), Some(b)) => a.rank().abs_diff(b.rank()) <= 1,
        _ => true,
    }
}

/// Join two free-text values without repeating content one already holds.
fn concat_dedup(base: &str, incoming: &str) -> String {
    if incoming.trim().is_empty() {
        return base.to_string();
    }
    if base.trim().is_empty() {
        return incoming.to_string();
    }
    let nb = normalize(base);
    let ni = normalize(incoming);
    if nb.contains(&ni) {
        base.to_string()
    } else if ni.contains(&nb) {
        incoming.to_string()
    } else {
        format!("{}\n\n{}", base.trim_end(), incoming.trim())
    }
}

fn resolve_ranked<T: Clone + PartialEq>(
    field: &str,
    base: &Option<T>,
    incoming: &Option<T>,
    rank: fn(&T) -> u8,
    label: fn(&T) -> &str,
    conflicts: &mut Vec<MergeConflict>,
) -> (Option<T>, bool) {
    match (base, incoming) {
        (Some(b), Some(i)) if b != i => {
            let incoming_wins = rank(i) > rank(b);
            conflicts.push(MergeConflict {
                field: field.to_string(),
                base_value: label(b).to_string(),
                incoming_value: label(i).to_string(),
                resolution: if incoming_wins {
                    ConflictResolution::UsedIncoming
                } else {
                    ConflictResolution::UsedBase
                },
            });
            if incoming_wins {
                (Some(i.clone()), true)
            } else {
                (Some(b.clone()), false)
            }
        }
        (None, Some(i)) => (Some(i.clone()), true),
        _ => (base.clone(), false),
    }
}

fn union_tags(base: &[String], incoming: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    base.iter()
        .chain(incoming.iter())
        .filter(|t| !t.trim().is_empty())
        .filter(|t| seen.insert(t.trim().to_lowercase()))
        .cloned()
        .collect()
}

/// Returns (steps, appended count, filled-in count). Steps are renumbered
/// from 1.
fn union_steps(base: &[Step], incoming: &[Step]) -> (Vec<Step>, usize, usize) {
    let mut steps: Vec<Step> = base.to_vec();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (i, step) in steps.iter().enumerate() {
        positions.entry(normalize(&step.action)).or_insert(i);
    }

    let mut added = 0;
    let mut modified = 0;
    for step in incoming {
        let key = normalize(&step.action);
        match positions.get(&key) {
            Some(&pos) => {
                let existing = &mut steps[pos];
                let mut filled = false;
                if existing.expected_result.trim().is_empty()
                    && !step.expected_result.trim().is_empty()
                {
                    existing.expected_result = step.expected_result.clone();
                    filled = true;
                }
                if existing.test_data.trim().is_empty() && !step.test_data.trim().is_empty() {
                    existing.test_data = step.test_data.clone();
                    filled = true;
                }
                if filled {
                    modified += 1;
                }
            }
            None => {
                positions.insert(key, steps.len());
                steps.push(step.clone());
                added += 1;
            }
        }
    }

    for (i, step) in steps.iter_mut().enumerate() {
        step.step_number = i as u32 + 1;
    }
    (steps, added, modified)
}
