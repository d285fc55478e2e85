//! tcdedup - deduplication engine for generated test cases
//!
//! tcdedup keeps a store of generated test case records free of duplicates.
//! New batches are checked on ingest by exact fingerprint and weighted
//! similarity; whole projects are cleaned up afterwards by SimHash
//! clustering.

pub mod cli;
pub mod config;
pub mod core;
pub mod dedup;
pub mod error;
pub mod storage;

pub use config::Config;
pub use core::{DedupMetadata, Priority, ProjectScope, Session, Status, Step, TestCaseRecord};
pub use dedup::{
    IngestOptions, IngestSummary, Ingestor, MergeResult, ReconcilePreview, ReconcileSummary,
    Reconciler, RecommendedAction, Simhash, SimilarityScore,
};
pub use error::{DedupError, Result};
pub use storage::{FileRecordStore, MemoryRecordStore, RecordStore};

// CLI commands
pub use cli::{BackfillCommand, FingerprintCommand, IngestCommand, ReconcileCommand, SimilarCommand};
