//! Which lab the launcher believes is running, persisted as one small JSON record.

use crate::error::StoreError;
use crate::fsutil::atomic_write_json_pretty;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const RUNNING_KEY: &str = "running_lab_id";

#[derive(Debug, Clone)]
pub struct RuntimeStore {
    path: PathBuf,
}

impl RuntimeStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Map<String, Value> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "runtime state unreadable, treating as empty");
                return Map::new();
            }
        };
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "runtime state is corrupt, treating as empty");
                Map::new()
            }
        }
    }

    /// The claimed running lab id, or `None` when unset, missing or unparseable.
    pub fn get(&self) -> Option<String> {
        self.read_record()
            .get(RUNNING_KEY)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Full read-modify-write of the record; other keys survive.
    pub fn set(&self, lab_id: Option<&str>) -> Result<(), StoreError> {
        let mut record = self.read_record();
        let value = match lab_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => Value::String(id.to_string()),
            None => Value::Null,
        };
        record.insert(RUNNING_KEY.to_string(), value);
        atomic_write_json_pretty(&self.path, &Value::Object(record))
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::scratch_dir;

    #[test]
    fn unwritten_store_reads_none() {
        let root = scratch_dir("runtime_empty");
        let store = RuntimeStore::open(root.join("runtime.json"));
        assert_eq!(store.get(), None);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn set_round_trips_across_reopen() {
        let root = scratch_dir("runtime_roundtrip");
        let path = root.join("state").join("runtime.json");
        RuntimeStore::open(&path)
            .set(Some("sqli-101"))
            .expect("set running");
        assert_eq!(RuntimeStore::open(&path).get().as_deref(), Some("sqli-101"));

        RuntimeStore::open(&path).set(None).expect("clear");
        assert_eq!(RuntimeStore::open(&path).get(), None);
        let raw: Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json record");
        assert!(raw[RUNNING_KEY].is_null());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn corrupt_file_reads_none_and_is_repaired_by_set() {
        let root = scratch_dir("runtime_corrupt");
        let path = root.join("runtime.json");
        fs::write(&path, "{not json").expect("write garbage");
        let store = RuntimeStore::open(&path);
        assert_eq!(store.get(), None);
        store.set(Some("token-tomb")).expect("set over corrupt file");
        assert_eq!(store.get().as_deref(), Some("token-tomb"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn set_preserves_unknown_keys() {
        let root = scratch_dir("runtime_keys");
        let path = root.join("runtime.json");
        fs::write(&path, r#"{"running_lab_id": null, "window": {"w": 1280}}"#).expect("seed");
        let store = RuntimeStore::open(&path);
        store.set(Some("leaklore")).expect("set");
        let raw: Value = serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["window"]["w"], 1280);
        assert_eq!(raw[RUNNING_KEY], "leaklore");
        let _ = fs::remove_dir_all(root);
    }
}
