//! Per-lab progress (started / solved timestamps, attempt counter) and notes, kept in SQLite.
//!
//! Every write is a single autocommitted statement with `synchronous = FULL`, so a solve is on
//! disk before the call returns.

use crate::error::StoreError;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS progress (
    lab_id     TEXT PRIMARY KEY,
    started_at TEXT,
    solved_at  TEXT,
    attempts   INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0)
);
CREATE TABLE IF NOT EXISTS notes (
    lab_id     TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    pub started_at: Option<String>,
    pub solved_at: Option<String>,
    pub attempts: u64,
}

impl ProgressRecord {
    pub fn is_solved(&self) -> bool {
        self.solved_at.is_some()
    }

    /// Solve time converted to the local timezone, if present and well-formed.
    pub fn solved_at_local(&self) -> Option<DateTime<Local>> {
        self.solved_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Local))
    }
}

pub type ProgressMap = BTreeMap<String, ProgressRecord>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub attempts: u64,
    pub started: u64,
    pub solved: u64,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn init_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)
}

pub struct ProgressStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ProgressStore {
    /// Opens (or creates) the store at `path`. A file that is not a usable database is moved
    /// aside and replaced by an empty store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }
        let conn = Connection::open(path)?;
        match init_connection(&conn) {
            Ok(()) => {}
            Err(err) if is_corruption(&err) => {
                drop(conn);
                let aside = path.with_extension(format!(
                    "db.corrupt-{}",
                    Utc::now().format("%Y%m%dT%H%M%S")
                ));
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "progress store is corrupt, starting fresh"
                );
                fs::rename(path, &aside).map_err(|e| StoreError::io(path, e))?;
                let conn = Connection::open(path)?;
                init_connection(&conn)?;
                return Ok(Self {
                    conn,
                    path: Some(path.to_path_buf()),
                });
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_connection(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Sets `started_at` unless it is already set.
    pub fn mark_started(&self, lab_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO progress (lab_id, started_at) VALUES (?1, ?2)
             ON CONFLICT(lab_id) DO UPDATE SET started_at = COALESCE(progress.started_at, excluded.started_at)",
            params![lab_id, now_iso()],
        )?;
        Ok(())
    }

    /// Unconditionally adds one attempt.
    pub fn mark_attempt(&self, lab_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO progress (lab_id, attempts) VALUES (?1, 1)
             ON CONFLICT(lab_id) DO UPDATE SET attempts = progress.attempts + 1",
            params![lab_id],
        )?;
        Ok(())
    }

    /// Sets `solved_at` unless it is already set. The first solve is permanent.
    pub fn mark_solved(&self, lab_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO progress (lab_id, solved_at) VALUES (?1, ?2)
             ON CONFLICT(lab_id) DO UPDATE SET solved_at = COALESCE(progress.solved_at, excluded.solved_at)",
            params![lab_id, now_iso()],
        )?;
        Ok(())
    }

    pub fn get(&self, lab_id: &str) -> Result<Option<ProgressRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT started_at, solved_at, attempts FROM progress WHERE lab_id = ?1",
                params![lab_id],
                |row| {
                    Ok(ProgressRecord {
                        started_at: row.get(0)?,
                        solved_at: row.get(1)?,
                        attempts: row.get::<_, i64>(2)?.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_progress_map(&self) -> Result<ProgressMap, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT lab_id, started_at, solved_at, attempts FROM progress")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ProgressRecord {
                    started_at: row.get(1)?,
                    solved_at: row.get(2)?,
                    attempts: row.get::<_, i64>(3)?.max(0) as u64,
                },
            ))
        })?;
        let mut out = ProgressMap::new();
        for row in rows {
            let (id, record) = row?;
            out.insert(id, record);
        }
        Ok(out)
    }

    pub fn get_summary(&self) -> Result<Summary, StoreError> {
        let summary = self.conn.query_row(
            "SELECT COALESCE(SUM(attempts), 0), COUNT(started_at), COUNT(solved_at) FROM progress",
            [],
            |row| {
                Ok(Summary {
                    attempts: row.get::<_, i64>(0)?.max(0) as u64,
                    started: row.get::<_, i64>(1)?.max(0) as u64,
                    solved: row.get::<_, i64>(2)?.max(0) as u64,
                })
            },
        )?;
        Ok(summary)
    }

    pub fn get_notes(&self, lab_id: &str) -> Result<String, StoreError> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM notes WHERE lab_id = ?1",
                params![lab_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body.unwrap_or_default())
    }

    /// Replaces the notes for `lab_id` wholesale.
    pub fn set_notes(&self, lab_id: &str, body: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO notes (lab_id, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(lab_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![lab_id, body, now_iso()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::scratch_dir;

    #[test]
    fn started_and_solved_are_first_write_wins() {
        let store = ProgressStore::open_in_memory().expect("store");
        store.mark_started("sqli-101").expect("start");
        store.mark_solved("sqli-101").expect("solve");
        let first = store.get("sqli-101").expect("get").expect("row");
        assert!(first.started_at.is_some());
        assert!(first.is_solved());

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.mark_started("sqli-101").expect("start again");
        store.mark_solved("sqli-101").expect("solve again");
        let second = store.get("sqli-101").expect("get").expect("row");
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(first.solved_at, second.solved_at);
    }

    #[test]
    fn attempts_are_strictly_additive() {
        let store = ProgressStore::open_in_memory().expect("store");
        store.mark_attempt("jwt-none").expect("attempt");
        store.mark_started("jwt-none").expect("start");
        store.mark_attempt("jwt-none").expect("attempt");
        store.mark_solved("jwt-none").expect("solve");
        store.mark_attempt("jwt-none").expect("attempt");
        assert_eq!(store.get("jwt-none").expect("get").expect("row").attempts, 3);
    }

    #[test]
    fn summary_aggregates_across_labs() {
        let store = ProgressStore::open_in_memory().expect("store");
        assert_eq!(store.get_summary().expect("empty summary"), Summary::default());
        for _ in 0..3 {
            store.mark_attempt("a").expect("attempt");
        }
        store.mark_attempt("b").expect("attempt");
        store.mark_started("b").expect("start");
        store.mark_solved("b").expect("solve");
        store.mark_started("c").expect("start");

        let summary = store.get_summary().expect("summary");
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.started, 2);
        assert_eq!(summary.solved, 1);

        let map = store.get_progress_map().expect("map");
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"].attempts, 3);
        assert!(map["a"].started_at.is_none());
        assert!(map["c"].solved_at.is_none());
    }

    #[test]
    fn notes_survive_reopen_and_are_last_write_wins() {
        let root = scratch_dir("progress_notes");
        let path = root.join("progress.db");
        {
            let store = ProgressStore::open(&path).expect("open");
            assert_eq!(store.get_notes("leaklore").expect("empty notes"), "");
            store.set_notes("leaklore", "first draft").expect("set");
            store.set_notes("leaklore", "x").expect("overwrite");
            store.mark_solved("leaklore").expect("solve");
        }
        let store = ProgressStore::open(&path).expect("reopen");
        assert_eq!(store.get_notes("leaklore").expect("notes"), "x");
        assert!(store.get("leaklore").expect("get").expect("row").is_solved());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn corrupt_database_is_moved_aside() {
        let root = scratch_dir("progress_corrupt");
        let path = root.join("progress.db");
        fs::write(&path, vec![0x42u8; 4096]).expect("garbage");
        let store = ProgressStore::open(&path).expect("open recovers");
        assert!(store.get_progress_map().expect("map").is_empty());
        store.mark_attempt("x").expect("writable");

        let moved = fs::read_dir(&root)
            .expect("list")
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains("corrupt"));
        assert!(moved, "corrupt file should be kept for inspection");
        let _ = fs::remove_dir_all(root);
    }
}
