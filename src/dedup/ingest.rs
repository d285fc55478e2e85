//! Per-batch dedup pipeline.
//!
//! Each incoming record is fingerprinted and checked, in order, against the
//! records already seen in the batch, the stored project snapshot, and
//! finally the similarity scorer. The store is read once before the batch
//! and written once after it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::fingerprint::{attach_metadata, fingerprint, legacy_signature};
use super::merge::{is_safe_merge, merge_at, MergeResult};
use super::simhash::{simhash_for_record, Simhash};
use super::similarity::{find_similar, has_comparable_text, recommended_action, RecommendedAction};
use crate::config::Config;
use crate::core::{ProjectScope, Session, TestCaseRecord};
use crate::error::{DedupError, Result};
use crate::storage::RecordStore;

/// Global counter for session IDs within one process.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a session ID.
///
/// Format: `ts_YYYYMMDDHHMMSS_NNN` where NNN is a sequence number.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("ts_{}_{:03}", now.format("%Y%m%d%H%M%S"), counter % 1000)
}

/// Where and how a batch is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestOptions {
    pub project_id: String,
    pub project_name: String,
    /// Source documents the batch was generated from.
    pub document_names: Vec<String>,
    /// Generator that produced the batch.
    pub model: String,
    /// Append to this session instead of starting a new one.
    pub continue_session_id: Option<String>,
}

impl IngestOptions {
    /// Options for a project with everything else empty.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Append to an existing session (created if missing).
    pub fn continue_session(mut self, session_id: impl Into<String>) -> Self {
        self.continue_session_id = Some(session_id.into());
        self
    }
}

/// A near-duplicate held back for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingReview {
    pub incoming: TestCaseRecord,
    pub existing: TestCaseRecord,
    pub score: f64,
    /// Tier the score fell in. `AutoMerge` here means the merge was unsafe.
    pub action: RecommendedAction,
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestSummary {
    /// Session the saved records were appended to.
    pub session_id: String,
    pub saved: usize,
    /// Records that failed individually.
    pub skipped: usize,
    /// Exact repeats of a stored record or of an earlier record in the batch.
    pub exact_duplicates: usize,
    pub auto_merged: usize,
    pub review_required: usize,
    pub merge_conflicts: Vec<PendingReview>,
    pub safety_valve_triggered: bool,
    /// Records whose legacy signature matched a stored record while the
    /// fingerprint did not. Informational only.
    pub legacy_matches: usize,
}

/// What to do with one incoming record.
enum Decision {
    InBatchRepeat,
    ExactDuplicate,
    Merge {
        location: (usize, usize),
        result: Box<MergeResult>,
    },
    Review(PendingReview),
    Save(TestCaseRecord),
}

/// Stored identity keys, read once at batch start.
struct Snapshot {
    fingerprints: HashSet<String>,
    legacy_signatures: HashSet<String>,
}

impl Snapshot {
    fn build(sessions: &[Session]) -> Self {
        let records = sessions.iter().flat_map(|s| s.test_cases.iter());
        let mut fingerprints = HashSet::new();
        let mut legacy_signatures = HashSet::new();
        for record in records {
            // Old records may predate fingerprints
            fingerprints.insert(
                record
                    .dedup
                    .fingerprint
                    .clone()
                    .unwrap_or_else(|| fingerprint(record)),
            );
            if let Some(sig) = &record.dedup.legacy_signature {
                legacy_signatures.insert(sig.clone());
            }
        }
        Self {
            fingerprints,
            legacy_signatures,
        }
    }
}

/// Runs batches of generated records against a project in the store.
pub struct Ingestor<S: RecordStore> {
    store: S,
    config: Config,
}

impl<S: RecordStore> Ingestor<S> {
    /// Create an ingestor over a store.
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest a batch, stamping new and merged records with the current time.
    pub fn ingest(
        &self,
        records: Vec<TestCaseRecord>,
        opts: &IngestOptions,
    ) -> Result<IngestSummary> {
        self.ingest_at(records, opts, Utc::now())
    }

    /// [`ingest`](Self::ingest) with an explicit clock.
    pub fn ingest_at(
        &self,
        records: Vec<TestCaseRecord>,
        opts: &IngestOptions,
        now: DateTime<Utc>,
    ) -> Result<IngestSummary> {
        if opts.project_id.trim().is_empty() {
            return Err(DedupError::invalid_input("project ID is required"));
        }

        let scope = ProjectScope::Project(opts.project_id.clone());
        let mut sessions = self.store.read_all(&scope)?;
        let snapshot = Snapshot::build(&sessions);
        let bits = self.config.simhash.bits;

        let records: Vec<TestCaseRecord> = records
            .into_iter()
            .map(|mut r| {
                attach_metadata(&mut r, bits);
                r
            })
            .collect();

        let mut summary = IngestSummary {
            safety_valve_triggered: self.safety_valve_trips(&records, &snapshot),
            ..Default::default()
        };

        let (session_idx, created) = open_session(&mut sessions, opts, now);
        summary.session_id = sessions[session_idx].id.clone();

        let mut ids: HashSet<String> = sessions
            .iter()
            .flat_map(|s| s.test_cases.iter())
            .map(|r| r.id.clone())
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut changed = false;

        for record in records {
            let decision = if summary.safety_valve_triggered {
                Decision::Save(record)
            } else {
                let legacy_hit = !snapshot.legacy_signatures.is_empty()
                    && record
                        .dedup
                        .fingerprint
                        .as_ref()
                        .is_some_and(|fp| !snapshot.fingerprints.contains(fp))
                    && snapshot
                        .legacy_signatures
                        .contains(&legacy_signature(&record));
                if legacy_hit {
                    summary.legacy_matches += 1;
                }
                self.decide(record, &sessions, &snapshot, &mut seen, now)
            };

            match decision {
                Decision::InBatchRepeat | Decision::ExactDuplicate => {
                    summary.exact_duplicates += 1;
                }
                Decision::Review(pending) => {
                    summary.review_required += 1;
                    summary.merge_conflicts.push(pending);
                }
                Decision::Merge { location, result } => {
                    match apply_merge(&mut sessions, location, *result, bits) {
                        Ok(()) => {
                            summary.auto_merged += 1;
                            changed = true;
                        }
                        Err(e) if e.is_record_level() => {
                            warn!("Skipping record: {}", e);
                            summary.skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Decision::Save(record) => {
                    save_record(record, &mut sessions[session_idx], &mut ids, opts, now);
                    summary.saved += 1;
                    changed = true;
                }
            }
        }

        let session = &mut sessions[session_idx];
        if summary.saved > 0 {
            session.updated_at = now;
            for name in &opts.document_names {
                if !session.document_names.contains(name) {
                    session.document_names.push(name.clone());
                }
            }
        }
        if created && session.test_cases.is_empty() {
            sessions.pop();
        }

        if changed {
            self.store.write_all(&scope, &sessions)?;
        }

        info!(
            project = %opts.project_id,
            session = %summary.session_id,
            saved = summary.saved,
            skipped = summary.skipped,
            exact_duplicates = summary.exact_duplicates,
            auto_merged = summary.auto_merged,
            review_required = summary.review_required,
            "Ingested batch"
        );

        Ok(summary)
    }

    /// Whether the batch looks like a wholesale re-import.
    fn safety_valve_trips(&self, records: &[TestCaseRecord], snapshot: &Snapshot) -> bool {
        let cfg = &self.config.ingest;
        if !cfg.safety_valve_enabled || records.len() <= cfg.min_batch {
            return false;
        }

        let mut seen = HashSet::new();
        let mut duplicates = 0;
        for record in records {
            let fp = record.dedup.fingerprint.clone().unwrap_or_default();
            let repeat = !seen.insert(fp.clone());
            if repeat || snapshot.fingerprints.contains(&fp) {
                duplicates += 1;
            }
        }

        let rate = duplicates as f64 / records.len() as f64;
        if rate > cfg.max_duplicate_rate {
            warn!(
                "Duplicate rate {:.0}% exceeds {:.0}% for a batch of {}; importing all records as new",
                rate * 100.0,
                cfg.max_duplicate_rate * 100.0,
                records.len()
            );
            return true;
        }
        false
    }

    fn decide(
        &self,
        record: TestCaseRecord,
        sessions: &[Session],
        snapshot: &Snapshot,
        seen: &mut HashSet<String>,
        now: DateTime<Utc>,
    ) -> Decision {
        let fp = record.dedup.fingerprint.clone().unwrap_or_default();

        if !seen.insert(fp.clone()) {
            debug!(title = %record.title, "Repeat within batch");
            return Decision::InBatchRepeat;
        }
        if snapshot.fingerprints.contains(&fp) {
            debug!(title = %record.title, "Exact duplicate of stored record");
            return Decision::ExactDuplicate;
        }

        let bits = self.config.simhash.bits;
        if !is_comparable(&record, bits) {
            debug!(module = %record.module, "No title or step text to compare; saving as new");
            return Decision::Save(record);
        }

        let locations: Vec<(usize, usize)> = sessions
            .iter()
            .enumerate()
            .flat_map(|(si, s)| (0..s.test_cases.len()).map(move |ci| (si, ci)))
            .filter(|&(si, ci)| is_comparable(&sessions[si].test_cases[ci], bits))
            .collect();
        let candidates = locations
            .iter()
            .map(|&(si, ci)| &sessions[si].test_cases[ci]);

        let best = find_similar(&record, candidates, self.config.similarity.ingest_min)
            .into_iter()
            .next()
            .map(|m| (locations[m.index], m.similarity.score, m.record));

        let Some((location, score, existing)) = best else {
            return Decision::Save(record);
        };

        let action = recommended_action(score, &self.config.similarity.thresholds());
        match action {
            RecommendedAction::AutoMerge if is_safe_merge(existing, &record) => {
                debug!(title = %record.title, into = %existing.id, score, "Auto-merging");
                Decision::Merge {
                    location,
                    result: Box::new(merge_at(existing, &record, now)),
                }
            }
            RecommendedAction::AutoMerge | RecommendedAction::ReviewMerge => {
                debug!(title = %record.title, against = %existing.id, score, %action, "Queued for review");
                Decision::Review(PendingReview {
                    incoming: record,
                    existing: existing.clone(),
                    score,
                    action,
                })
            }
            RecommendedAction::KeepSeparate => Decision::Save(record),
        }
    }
}

/// Whether similarity scoring is meaningful for a record: it needs title or
/// step text and a non-zero SimHash.
fn is_comparable(record: &TestCaseRecord, bits: usize) -> bool {
    if !has_comparable_text(record) {
        return false;
    }
    let hash = record
        .dedup
        .simhash
        .as_deref()
        .and_then(Simhash::from_hex)
        .unwrap_or_else(|| simhash_for_record(record, bits));
    !hash.is_zero()
}

/// Find or create the session saved records go to. Returns its index and
/// whether it was created for this batch.
fn open_session(
    sessions: &mut Vec<Session>,
    opts: &IngestOptions,
    now: DateTime<Utc>,
) -> (usize, bool) {
    if let Some(id) = &opts.continue_session_id {
        if let Some(idx) = sessions.iter().position(|s| &s.id == id) {
            return (idx, false);
        }
    }

    let id = match &opts.continue_session_id {
        Some(id) => id.clone(),
        None => loop {
            let candidate = generate_session_id(now);
            if !sessions.iter().any(|s| s.id == candidate) {
                break candidate;
            }
        },
    };

    let mut session = Session::new(id, opts.project_id.clone());
    session.project_name = opts.project_name.clone();
    session.document_names = opts.document_names.clone();
    session.model = opts.model.clone();
    session.created_at = now;
    session.updated_at = now;
    sessions.push(session);
    (sessions.len() - 1, true)
}

fn apply_merge(
    sessions: &mut [Session],
    (si, ci): (usize, usize),
    result: MergeResult,
    bits: usize,
) -> Result<()> {
    let slot = sessions
        .get_mut(si)
        .and_then(|s| s.test_cases.get_mut(ci))
        .ok_or_else(|| DedupError::record_not_found(result.merged_case.id.clone()))?;

    let mut merged = result.merged_case;
    attach_metadata(&mut merged, bits);
    *slot = merged;
    Ok(())
}

fn save_record(
    mut record: TestCaseRecord,
    session: &mut Session,
    ids: &mut HashSet<String>,
    opts: &IngestOptions,
    now: DateTime<Utc>,
) {
    record.project_id = opts.project_id.clone();
    if record.project_name.is_empty() {
        record.project_name = opts.project_name.clone();
    }
    if record.created_at.is_none() {
        record.created_at = Some(now);
    }
    if record.version == 0 {
        record.version = 1;
    }
    if record.id.trim().is_empty() || ids.contains(&record.id) {
        let mut n = session.test_cases.len() + 1;
        record.id = loop {
            let candidate = format!("{}-{:03}", session.id, n);
            if !ids.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
    }
    ids.insert(record.id.clone());
    session.test_cases.push(record);
}
