//! In-memory record storage for testing.
//!
//! This module provides a thread-safe in-memory implementation of the
//! RecordStore trait, primarily for use in unit tests.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::{ProjectScope, Session};
use crate::error::Result;
use crate::storage::RecordStore;

/// In-memory record store for testing.
///
/// Thread-safe implementation using `RwLock<HashMap>` keyed by project ID.
/// Sessions are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    projects: RwLock<HashMap<String, Vec<Session>>>,
}

impl MemoryRecordStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store pre-populated with sessions, routed by project ID.
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let store = Self::new();
        {
            let mut projects = store.write();
            for session in sessions {
                projects
                    .entry(session.project_id.clone())
                    .or_default()
                    .push(session);
            }
        }
        store
    }

    /// Total number of records across all projects.
    pub fn record_count(&self) -> usize {
        self.read()
            .values()
            .flat_map(|sessions| sessions.iter())
            .map(|s| s.test_cases.len())
            .sum()
    }

    /// Check if the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.read().values().all(Vec::is_empty)
    }

    // A poisoned lock still holds consistent data: every write replaces a
    // whole project at once.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Session>>> {
        self.projects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Session>>> {
        self.projects.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn read_all(&self, scope: &ProjectScope) -> Result<Vec<Session>> {
        let projects = self.read();
        match scope {
            ProjectScope::Project(id) => Ok(projects.get(id).cloned().unwrap_or_default()),
            ProjectScope::All => {
                let mut ids: Vec<&String> = projects.keys().collect();
                ids.sort();
                Ok(ids
                    .into_iter()
                    .flat_map(|id| projects[id].iter().cloned())
                    .collect())
            }
        }
    }

    fn write_all(&self, scope: &ProjectScope, sessions: &[Session]) -> Result<()> {
        let mut projects = self.write();
        match scope {
            ProjectScope::Project(id) => {
                if sessions.is_empty() {
                    projects.remove(id);
                } else {
                    projects.insert(id.clone(), sessions.to_vec());
                }
            }
            ProjectScope::All => {
                projects.clear();
                for session in sessions {
                    projects
                        .entry(session.project_id.clone())
                        .or_default()
                        .push(session.clone());
                }
            }
        }
        Ok(())
    }

    fn project_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, sessions)| !sessions.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TestCaseRecord;
    use crate::storage::traits::tests::test_record_store_contract;

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryRecordStore::new();
        test_record_store_contract(&store);
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = MemoryRecordStore::default();
        assert!(store.is_empty());
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_with_sessions_routes_by_project() {
        let store = MemoryRecordStore::with_sessions(vec![
            Session::new("s1", "p1").with_cases(vec![TestCaseRecord::new("a", "m")]),
            Session::new("s2", "p2").with_cases(vec![
                TestCaseRecord::new("b", "m"),
                TestCaseRecord::new("c", "m"),
            ]),
        ]);
        assert_eq!(store.project_ids().unwrap(), vec!["p1", "p2"]);
        assert_eq!(store.record_count(), 3);
        assert_eq!(
            store
                .read_all(&ProjectScope::Project("p2".to_string()))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryRecordStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let scope = ProjectScope::Project(format!("p{}", i));
                let session = Session::new(format!("s{}", i), format!("p{}", i));
                store_clone.write_all(&scope, &[session]).unwrap();
                store_clone.read_all(&scope).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.project_ids().unwrap().len(), 10);
    }
}
