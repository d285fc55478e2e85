//! CLI commands for tcdedup.
//!
//! This module provides CLI commands for tcdedup, organized into:
//! - **Pipeline commands**: ingest, reconcile, preview, backfill
//! - **Inspection commands**: similar, fingerprint

pub mod input;

// Pipeline commands
pub mod backfill;
pub mod ingest;
pub mod reconcile;

// Inspection commands
pub mod inspect;

pub use backfill::BackfillCommand;
pub use ingest::IngestCommand;
pub use inspect::{FingerprintCommand, SimilarCommand};
pub use reconcile::ReconcileCommand;
