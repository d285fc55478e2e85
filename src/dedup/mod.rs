//! The dedup engine.
//!
//! Leaf modules are pure functions over records: [`canonical`],
//! [`fingerprint`], [`simhash`], [`similarity`] and [`merge`]. The
//! [`ingest`] and [`reconcile`] pipelines combine them against a
//! [`RecordStore`](crate::storage::RecordStore).

pub mod canonical;
pub mod fingerprint;
pub mod ingest;
pub mod merge;
pub mod reconcile;
pub mod simhash;
pub mod similarity;

pub use canonical::normalize;
pub use fingerprint::{
    attach_metadata, canonical_string, compute_metadata, fingerprint, legacy_signature,
    loose_fingerprint,
};
pub use ingest::{IngestOptions, IngestSummary, Ingestor, PendingReview};
pub use merge::{
    is_safe_merge, merge, merge_at, ConflictResolution, MergeChanges, MergeConflict, MergeResult,
};
pub use reconcile::{
    BackfillSummary, ClusterAudit, DuplicateCluster, ReconcilePreview, ReconcileSummary,
    Reconciler,
};
pub use simhash::{are_similar, build_simhash, hamming, simhash_for_record, Simhash};
pub use similarity::{
    find_similar, has_comparable_text, recommended_action, similarity, ActionThresholds,
    RecommendedAction, SimilarMatch, SimilarityScore,
};
