//! Record storage traits.
//!
//! This module defines the `RecordStore` trait the ingest and reconcile
//! pipelines read from and write to.

use std::sync::Arc;

use crate::core::{ProjectScope, Session};
use crate::error::Result;

/// Trait for record storage backends.
///
/// A store holds an ordered list of sessions per project. Reads and writes
/// always cover a whole scope: callers load the collection, change it in
/// memory, and write it back once.
pub trait RecordStore: Send + Sync {
    /// Read every session in scope.
    ///
    /// Sessions keep their stored order. For [`ProjectScope::All`], projects
    /// are visited in ascending ID order. An unknown project reads as empty.
    fn read_all(&self, scope: &ProjectScope) -> Result<Vec<Session>>;

    /// Replace every session in scope with `sessions`.
    ///
    /// For [`ProjectScope::All`], sessions are routed by their `project_id`
    /// and projects absent from `sessions` become empty.
    fn write_all(&self, scope: &ProjectScope, sessions: &[Session]) -> Result<()>;

    /// IDs of every project holding at least one session, ascending.
    fn project_ids(&self) -> Result<Vec<String>>;

    /// Read-modify-write a scope.
    ///
    /// Nothing is written if `f` fails.
    fn transact<T, F>(&self, scope: &ProjectScope, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Session>) -> Result<T>,
        Self: Sized,
    {
        let mut sessions = self.read_all(scope)?;
        let out = f(&mut sessions)?;
        self.write_all(scope, &sessions)?;
        Ok(out)
    }
}

/// Blanket implementation of RecordStore for Arc-wrapped stores.
///
/// This allows sharing one store between a test and the pipeline under test.
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn read_all(&self, scope: &ProjectScope) -> Result<Vec<Session>> {
        (**self).read_all(scope)
    }

    fn write_all(&self, scope: &ProjectScope, sessions: &[Session]) -> Result<()> {
        (**self).write_all(scope, sessions)
    }

    fn project_ids(&self) -> Result<Vec<String>> {
        (**self).project_ids()
    }
}
