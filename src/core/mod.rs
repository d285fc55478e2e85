//! Core record types.
//!
//! This module contains the test case record, its steps and dedup metadata,
//! the session grouping records are stored in, and the ranked priority and
//! status labels the merge engine compares.

pub mod rank;
pub mod record;

pub use rank::{Priority, Status};
pub use record::{DedupMetadata, ProjectScope, Session, Step, TestCaseRecord};
