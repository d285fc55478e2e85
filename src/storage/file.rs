//! File-based record storage.
//!
//! Each project is one JSON file, `<data_dir>/<project_id>.json`, holding the
//! project's ordered list of sessions. Atomic writes are achieved via temp
//! file + rename pattern.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::data_dir;
use crate::core::{ProjectScope, Session};
use crate::error::{DedupError, Result};
use crate::storage::RecordStore;

/// File-based record storage.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    /// Directory where project files are stored.
    data_dir: PathBuf,
}

impl FileRecordStore {
    /// Create a new file store with the default directory.
    ///
    /// Uses `~/.tcdedup/data/` or `$TCDEDUP_HOME/data/`.
    pub fn new() -> Result<Self> {
        let dir = data_dir().ok_or_else(|| {
            DedupError::config("Could not determine data directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a new file store with a custom directory.
    pub fn with_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).map_err(|e| DedupError::storage(&data_dir, e))?;
        }

        Ok(Self { data_dir })
    }

    /// Directory holding the project files.
    pub fn dir(&self) -> &Path {
        &self.data_dir
    }

    /// Project IDs become file names, so they may not contain path
    /// separators or start with a dot.
    fn validate_project_id(id: &str) -> Result<()> {
        if id.is_empty()
            || id.starts_with('.')
            || id.contains(['/', '\\'])
            || id.contains('\0')
        {
            return Err(DedupError::invalid_input(format!(
                "project ID {:?} cannot be used as a file name",
                id
            )));
        }
        Ok(())
    }

    fn project_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", id))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!(".{}.json.tmp", id))
    }

    fn read_project(&self, id: &str) -> Result<Vec<Session>> {
        Self::validate_project_id(id)?;
        let path = self.project_path(id);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| DedupError::storage(&path, e))?;
        let sessions: Vec<Session> = serde_json::from_str(&content)?;
        Ok(sessions)
    }

    /// Write a project atomically. An empty project removes its file.
    fn write_project(&self, id: &str, sessions: &[Session]) -> Result<()> {
        Self::validate_project_id(id)?;
        let final_path = self.project_path(id);

        if sessions.is_empty() {
            if final_path.exists() {
                fs::remove_file(&final_path).map_err(|e| DedupError::storage(&final_path, e))?;
            }
            return Ok(());
        }

        let temp_path = self.temp_path(id);
        let json = serde_json::to_string_pretty(sessions)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| DedupError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| DedupError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| DedupError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &final_path).map_err(|e| DedupError::storage(&final_path, e))?;

        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn read_all(&self, scope: &ProjectScope) -> Result<Vec<Session>> {
        match scope {
            ProjectScope::Project(id) => self.read_project(id),
            ProjectScope::All => {
                let mut sessions = Vec::new();
                for id in self.project_ids()? {
                    sessions.extend(self.read_project(&id)?);
                }
                Ok(sessions)
            }
        }
    }

    fn write_all(&self, scope: &ProjectScope, sessions: &[Session]) -> Result<()> {
        match scope {
            ProjectScope::Project(id) => self.write_project(id, sessions),
            ProjectScope::All => {
                let mut routed: Vec<(String, Vec<Session>)> = Vec::new();
                for session in sessions {
                    match routed.iter_mut().find(|(id, _)| *id == session.project_id) {
                        Some((_, group)) => group.push(session.clone()),
                        None => routed.push((session.project_id.clone(), vec![session.clone()])),
                    }
                }

                for existing in self.project_ids()? {
                    if !routed.iter().any(|(id, _)| *id == existing) {
                        self.write_project(&existing, &[])?;
                    }
                }
                for (id, group) in &routed {
                    self.write_project(id, group)?;
                }
                Ok(())
            }
        }
    }

    fn project_ids(&self) -> Result<Vec<String>> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.data_dir).map_err(|e| DedupError::storage(&self.data_dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DedupError::storage(&self.data_dir, e))?;
            let path = entry.path();

            // Skip non-JSON files and temp files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            ids.push(stem);
        }

        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TestCaseRecord;
    use crate::storage::traits::tests::test_record_store_contract;
    use tempfile::TempDir;

    fn create_test_store() -> (FileRecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::with_dir(dir.path()).unwrap();
        (store, dir)
    }

    fn project(id: &str) -> ProjectScope {
        ProjectScope::Project(id.to_string())
    }

    #[test]
    fn test_file_store_contract() {
        let (store, _dir) = create_test_store();
        test_record_store_contract(&store);
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let data_path = dir.path().join("data");

        assert!(!data_path.exists());

        let _store = FileRecordStore::with_dir(&data_path).unwrap();

        assert!(data_path.is_dir());
    }

    #[test]
    fn test_project_file_layout() {
        let (store, dir) = create_test_store();
        let session = Session::new("s1", "proj").with_cases(vec![TestCaseRecord::new("t", "m")]);
        store.write_all(&project("proj"), &[session]).unwrap();

        let path = dir.path().join("proj.json");
        assert!(path.exists());
        let parsed: Vec<Session> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0].id, "s1");
        assert_eq!(parsed[0].test_cases[0].title, "t");
    }

    #[test]
    fn test_temp_file_cleaned_up() {
        let (store, _dir) = create_test_store();
        store
            .write_all(&project("proj"), &[Session::new("s1", "proj")])
            .unwrap();
        assert!(!store.temp_path("proj").exists());
    }

    #[test]
    fn test_project_ids_ignore_temp_and_other_files() {
        let (store, dir) = create_test_store();
        store
            .write_all(&project("proj"), &[Session::new("s1", "proj")])
            .unwrap();
        fs::write(dir.path().join(".other.json.tmp"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        assert_eq!(store.project_ids().unwrap(), vec!["proj"]);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let (store, dir) = create_test_store();
        fs::write(dir.path().join("broken.json"), "not valid json").unwrap();

        let err = store.read_all(&project("broken")).unwrap_err();
        assert!(matches!(err, DedupError::Serde { .. }));
    }

    #[test]
    fn test_rejects_path_like_project_ids() {
        let (store, _dir) = create_test_store();
        for bad in ["", "../escape", "a/b", ".hidden"] {
            let err = store.read_all(&project(bad)).unwrap_err();
            assert!(matches!(err, DedupError::InvalidInput { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_records_keep_metadata_across_reload() {
        let (store, dir) = create_test_store();
        let mut record = TestCaseRecord::new("Valid login", "Login").with_id("r1");
        record.dedup.fingerprint = Some("f".repeat(64));
        record.dedup.simhash = Some("00000000000000ff".to_string());
        store
            .write_all(
                &project("proj"),
                &[Session::new("s1", "proj").with_cases(vec![record.clone()])],
            )
            .unwrap();

        let reopened = FileRecordStore::with_dir(dir.path()).unwrap();
        let sessions = reopened.read_all(&project("proj")).unwrap();
        assert_eq!(sessions[0].test_cases[0], record);
    }
}
