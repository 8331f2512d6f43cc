use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::FileStamp;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::error::LibraryError;
use crate::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_OPS: i32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathRow {
    pub id: i64,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderRow {
    pub id: i64,
    pub fullpath: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackFile {
    pub id: i64,
    pub path: String,
}

/// Connection to the relational index. Only the indexer worker (or a one-shot
/// reindex) writes through it.
pub struct IndexStore {
    pub(crate) conn: Connection,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn)
    }

    /// Read-only handle used by client threads; never touches the schema.
    pub fn open_read_only(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    fn prepare(mut conn: Connection) -> Result<Self, LibraryError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        ensure_schema(&mut conn)?;
        Ok(Self { conn })
    }

    /// Abort any running statement once the exit flag is raised.
    pub fn set_interrupt(&self, cancel: &CancelToken) {
        let exit = cancel.exit_flag();
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || exit.load(Ordering::Acquire)));
    }

    pub fn paths(&self) -> Result<Vec<PathRow>, LibraryError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, path FROM paths ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(PathRow {
                id: row.get(0)?,
                path: row.get(1)?,
            })
        })?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    /// Inserts the exact path string unless a row already holds it.
    pub fn add_path(&self, path: &str) -> Result<bool, LibraryError> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM paths WHERE path = ?1", [path], |row| {
                row.get(0)
            })
            .optional()?;
        if existing.is_some() {
            trace!("path {} already registered", path);
            return Ok(false);
        }
        self.conn
            .execute("INSERT INTO paths (path) VALUES (?1)", [path])?;
        Ok(true)
    }

    pub fn remove_path(&self, path: &str) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM paths WHERE path = ?1", [path])?;
        Ok(removed > 0)
    }

    /// Folders whose path row is gone; their tracks cascade.
    pub fn delete_orphan_folders(&self) -> Result<usize, LibraryError> {
        let removed = self.conn.execute(
            "DELETE FROM folders WHERE path_id NOT IN (SELECT id FROM paths)",
            [],
        )?;
        if removed > 0 {
            debug!("removed {} folders of unregistered paths", removed);
        }
        Ok(removed)
    }

    pub fn folder_id(
        &self,
        name: &str,
        path_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Option<i64>, LibraryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id FROM folders WHERE name = ?1 AND path_id = ?2 AND parent_id IS ?3",
        )?;
        let id = stmt
            .query_row(params![name, path_id, parent_id], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    pub fn ensure_folder(
        &self,
        name: &str,
        path_id: i64,
        parent_id: Option<i64>,
        fullpath: &str,
    ) -> Result<i64, LibraryError> {
        if let Some(id) = self.folder_id(name, path_id, parent_id)? {
            return Ok(id);
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO folders (name, path_id, parent_id, fullpath) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![name, path_id, parent_id, fullpath])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn folders_for_path(&self, path_id: i64) -> Result<Vec<FolderRow>, LibraryError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, fullpath FROM folders WHERE path_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([path_id], |row| {
            Ok(FolderRow {
                id: row.get(0)?,
                fullpath: row.get(1)?,
            })
        })?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    pub fn delete_folder(&self, folder_id: i64) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", [folder_id])?;
        Ok(removed > 0)
    }

    /// Stored id and stamp of the track at `(folder_id, filename)`.
    pub fn track_stamp(
        &self,
        folder_id: i64,
        filename: &str,
    ) -> Result<Option<(i64, FileStamp)>, LibraryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, filesize, filetime FROM tracks WHERE folder_id = ?1 AND filename = ?2",
        )?;
        let row = stmt
            .query_row(params![folder_id, filename], |row| {
                Ok((
                    row.get(0)?,
                    FileStamp {
                        size: row.get(1)?,
                        mtime: row.get(2)?,
                    },
                ))
            })
            .optional()?;
        Ok(row)
    }

    pub fn tracks_for_path(&self, path_id: i64) -> Result<Vec<TrackFile>, LibraryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT t.id, f.fullpath, t.filename FROM tracks t
             JOIN folders f ON f.id = t.folder_id
             WHERE f.path_id = ?1
             ORDER BY t.id",
        )?;
        let rows = stmt.query_map([path_id], |row| {
            let fullpath: String = row.get(1)?;
            let filename: String = row.get(2)?;
            Ok(TrackFile {
                id: row.get(0)?,
                path: format!("{}{}", fullpath, filename),
            })
        })?;
        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row?);
        }
        Ok(tracks)
    }

    pub fn delete_track(&self, track_id: i64) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM tracks WHERE id = ?1", [track_id])?;
        Ok(removed > 0)
    }

    pub fn delete_tracks_without_folder(&self) -> Result<usize, LibraryError> {
        let removed = self.conn.execute(
            "DELETE FROM tracks WHERE folder_id NOT IN (SELECT id FROM folders)",
            [],
        )?;
        Ok(removed)
    }

    pub fn track_count(&self) -> Result<u64, LibraryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn ensure_schema(conn: &mut Connection) -> Result<(), LibraryError> {
    conn.execute_batch(schema::META_SCHEMA)?;
    let version: Option<u32> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema'", [], |row| {
            row.get(0)
        })
        .optional()?;

    match version {
        Some(version) if version == schema::SCHEMA_VERSION => Ok(()),
        Some(version) => Err(LibraryError::SchemaVersion(version)),
        None => {
            debug!("creating index schema v{}", schema::SCHEMA_VERSION);
            let tx = conn.transaction()?;
            tx.execute_batch(schema::INDEX_SCHEMA)?;
            tx.execute(
                "INSERT INTO meta (key, value) VALUES ('schema', ?1)",
                [schema::SCHEMA_VERSION],
            )?;
            tx.commit()?;
            Ok(())
        }
    }
}
