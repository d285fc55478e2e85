//! Retroactive clustering and cleanup of stored records.
//!
//! Records are grouped by project and normalized module, then clustered
//! greedily in store order: each unclaimed record claims every later
//! unclaimed record whose SimHash is within the Hamming threshold of its
//! own. Records without a usable SimHash are left alone; run
//! [`Reconciler::backfill_simhash`] first to give old records one.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::canonical::normalize;
use super::fingerprint::attach_metadata;
use super::merge::{is_safe_merge, merge_at};
use super::simhash::{hamming, Simhash};
use crate::config::Config;
use crate::core::{ProjectScope, Session, TestCaseRecord};
use crate::error::Result;
use crate::storage::RecordStore;

/// A group of near-identical records. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Member IDs in store order.
    pub members: Vec<String>,
    pub keep_id: String,
    /// `members` without `keep_id`.
    pub remove_ids: Vec<String>,
    /// Normalized module the cluster was found in.
    pub module: String,
}

/// What reconciliation did to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAudit {
    pub keep_id: String,
    pub keep_title: String,
    pub removed_ids: Vec<String>,
    pub removed_titles: Vec<String>,
    /// Removed members whose content was folded into the kept record.
    pub merged_ids: Vec<String>,
    pub reason: String,
}

/// Result of [`Reconciler::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Records in scope before cleanup.
    pub total_cases: usize,
    pub duplicate_groups: usize,
    pub cases_removed: usize,
    pub cases_merged: usize,
    pub details: Vec<ClusterAudit>,
}

/// Result of [`Reconciler::preview_reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePreview {
    pub duplicate_groups: Vec<DuplicateCluster>,
    pub total_would_remove: usize,
}

/// Result of [`Reconciler::backfill_simhash`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSummary {
    pub updated: usize,
}

/// Positions into the flattened record list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClusterPlan {
    keep: usize,
    members: Vec<usize>,
    module: String,
}

impl ClusterPlan {
    fn removed(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied().filter(move |&i| i != self.keep)
    }

    fn to_cluster(&self, records: &[ScopedRecord<'_>]) -> DuplicateCluster {
        DuplicateCluster {
            members: self
                .members
                .iter()
                .map(|&i| records[i].record.id.clone())
                .collect(),
            keep_id: records[self.keep].record.id.clone(),
            remove_ids: self
                .removed()
                .map(|i| records[i].record.id.clone())
                .collect(),
            module: self.module.clone(),
        }
    }
}

/// A record together with the project it is stored under.
struct ScopedRecord<'a> {
    project_id: &'a str,
    record: &'a TestCaseRecord,
}

fn flatten(sessions: &[Session]) -> Vec<ScopedRecord<'_>> {
    sessions
        .iter()
        .flat_map(|s| {
            s.test_cases.iter().map(move |record| ScopedRecord {
                project_id: s.project_id.as_str(),
                record,
            })
        })
        .collect()
}

/// The stored SimHash, if present, parseable and non-zero.
fn usable_simhash(record: &TestCaseRecord) -> Option<Simhash> {
    record
        .dedup
        .simhash
        .as_deref()
        .and_then(Simhash::from_hex)
        .filter(|h| !h.is_zero())
}

/// Greedy SimHash clustering over records in store order.
fn plan_clusters(records: &[ScopedRecord<'_>], threshold: u32) -> Vec<ClusterPlan> {
    // (project, module) groups in first-seen order
    let mut groups: Vec<((&str, String), Vec<(usize, Simhash)>)> = Vec::new();
    for (i, scoped) in records.iter().enumerate() {
        let Some(hash) = usable_simhash(scoped.record) else {
            continue;
        };
        let key = (scoped.project_id, normalize(&scoped.record.module));
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push((i, hash)),
            None => groups.push((key, vec![(i, hash)])),
        }
    }

    let mut plans = Vec::new();
    for ((_, module), members) in groups {
        let mut claimed = vec![false; members.len()];
        for a in 0..members.len() {
            if claimed[a] {
                continue;
            }
            claimed[a] = true;
            let (seed, seed_hash) = &members[a];
            let mut cluster = vec![*seed];
            for b in (a + 1)..members.len() {
                if !claimed[b] && hamming(seed_hash, &members[b].1) <= threshold {
                    claimed[b] = true;
                    cluster.push(members[b].0);
                }
            }
            if cluster.len() > 1 {
                plans.push(ClusterPlan {
                    keep: choose_keep(&cluster, records),
                    members: cluster,
                    module: module.clone(),
                });
            }
        }
    }
    plans
}

/// Most steps, then earliest created, then first in store order.
fn choose_keep(members: &[usize], records: &[ScopedRecord<'_>]) -> usize {
    let mut best = members[0];
    for &candidate in &members[1..] {
        let (b, c) = (records[best].record, records[candidate].record);
        let better = c.steps.len() > b.steps.len()
            || (c.steps.len() == b.steps.len() && c.created_sort_key() < b.created_sort_key());
        if better {
            best = candidate;
        }
    }
    best
}

/// Whole-scope clustering, cleanup and metadata backfill.
pub struct Reconciler<S: RecordStore> {
    store: S,
    config: Config,
}

impl<S: RecordStore> Reconciler<S> {
    /// Create a reconciler over a store.
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Find the clusters [`reconcile`](Self::reconcile) would act on,
    /// without changing anything.
    pub fn preview_reconcile(
        &self,
        scope: &ProjectScope,
        threshold: u32,
    ) -> Result<ReconcilePreview> {
        let sessions = self.store.read_all(scope)?;
        let records = flatten(&sessions);
        let duplicate_groups: Vec<DuplicateCluster> = plan_clusters(&records, threshold)
            .iter()
            .map(|p| p.to_cluster(&records))
            .collect();
        let total_would_remove = duplicate_groups.iter().map(|c| c.remove_ids.len()).sum();
        Ok(ReconcilePreview {
            duplicate_groups,
            total_would_remove,
        })
    }

    /// Cluster the scope and delete every non-kept member.
    pub fn reconcile(&self, scope: &ProjectScope, threshold: u32) -> Result<ReconcileSummary> {
        self.reconcile_at(scope, threshold, Utc::now())
    }

    /// [`reconcile`](Self::reconcile) with an explicit clock for merges.
    pub fn reconcile_at(
        &self,
        scope: &ProjectScope,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary> {
        let mut sessions = self.store.read_all(scope)?;

        let locations: Vec<(usize, usize)> = sessions
            .iter()
            .enumerate()
            .flat_map(|(si, s)| (0..s.test_cases.len()).map(move |ci| (si, ci)))
            .collect();

        let (plans, summary, replacements) = {
            let records = flatten(&sessions);
            let plans = plan_clusters(&records, threshold);
            let mut summary = ReconcileSummary {
                total_cases: records.len(),
                ..Default::default()
            };
            let mut replacements: Vec<(usize, TestCaseRecord)> = Vec::new();

            for plan in &plans {
                let keep = records[plan.keep].record;
                let mut kept = keep.clone();
                let mut audit = ClusterAudit {
                    keep_id: keep.id.clone(),
                    keep_title: keep.title.clone(),
                    removed_ids: Vec::new(),
                    removed_titles: Vec::new(),
                    merged_ids: Vec::new(),
                    reason: format!(
                        "SimHash within Hamming distance {} in module '{}'",
                        threshold, plan.module
                    ),
                };

                for i in plan.removed() {
                    let removed = records[i].record;
                    audit.removed_ids.push(removed.id.clone());
                    audit.removed_titles.push(removed.title.clone());
                    if self.config.reconcile.merge_into_keep && is_safe_merge(&kept, removed) {
                        kept = merge_at(&kept, removed, now).merged_case;
                        audit.merged_ids.push(removed.id.clone());
                    }
                }

                if !audit.merged_ids.is_empty() {
                    attach_metadata(&mut kept, self.config.simhash.bits);
                    replacements.push((plan.keep, kept));
                }

                debug!(
                    keep = %audit.keep_id,
                    removed = audit.removed_ids.len(),
                    merged = audit.merged_ids.len(),
                    "Reconciled cluster"
                );
                summary.cases_removed += audit.removed_ids.len();
                summary.cases_merged += audit.merged_ids.len();
                summary.details.push(audit);
            }
            summary.duplicate_groups = plans.len();
            (plans, summary, replacements)
        };

        if plans.is_empty() {
            info!(scope = %scope, total = summary.total_cases, "No duplicates found");
            return Ok(summary);
        }

        for (i, record) in replacements {
            let (si, ci) = locations[i];
            sessions[si].test_cases[ci] = record;
        }

        let removed: HashSet<(usize, usize)> = plans
            .iter()
            .flat_map(|p| p.removed())
            .map(|i| locations[i])
            .collect();
        for (si, session) in sessions.iter_mut().enumerate() {
            let mut ci = 0;
            session.test_cases.retain(|_| {
                let keep = !removed.contains(&(si, ci));
                ci += 1;
                keep
            });
        }

        self.store.write_all(scope, &sessions)?;

        info!(
            scope = %scope,
            groups = summary.duplicate_groups,
            removed = summary.cases_removed,
            merged = summary.cases_merged,
            "Reconciled records"
        );
        Ok(summary)
    }

    /// Compute missing fingerprints and SimHash for every stored record.
    pub fn backfill_simhash(&self) -> Result<BackfillSummary> {
        let bits = self.config.simhash.bits;
        let updated = self.store.transact(&ProjectScope::All, |sessions| {
            let mut updated = 0;
            for record in sessions.iter_mut().flat_map(|s| s.test_cases.iter_mut()) {
                let simhash_ok = record
                    .dedup
                    .simhash
                    .as_deref()
                    .is_some_and(|h| Simhash::from_hex(h).is_some());
                if !record.dedup.is_complete() || !simhash_ok {
                    attach_metadata(record, bits);
                    updated += 1;
                }
            }
            Ok(updated)
        })?;

        info!(updated, "Backfilled record metadata");
        Ok(BackfillSummary { updated })
    }
}
