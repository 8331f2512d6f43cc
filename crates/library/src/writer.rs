use std::fs;
use std::path::{Path, PathBuf};

use common::content_checksum;
use metadata::{TrackDraft, KEY_ALBUM, KEY_ARTIST, KEY_DURATION, KEY_GENRE, KEY_TITLE, KEY_TRACK, KEY_YEAR};
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::warn;

use crate::error::LibraryError;
use crate::store::IndexStore;

const AGGREGATE_SEP: &str = ", ";

#[derive(Clone, Copy)]
enum NameTable {
    Artists,
    Genres,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Artists => "artists",
            NameTable::Genres => "genres",
        }
    }

    fn link_table(self) -> &'static str {
        match self {
            NameTable::Artists => "track_artists",
            NameTable::Genres => "track_genres",
        }
    }

    fn link_column(self) -> &'static str {
        match self {
            NameTable::Artists => "artist_id",
            NameTable::Genres => "genre_id",
        }
    }
}

pub fn thumbnail_path(thumbs_dir: &Path, thumbnail_id: i64) -> PathBuf {
    thumbs_dir.join(format!("{}.jpg", thumbnail_id))
}

impl IndexStore {
    /// Writes one track and all of its links in a single transaction.
    pub fn save_track(
        &mut self,
        draft: &TrackDraft,
        folder_id: i64,
        existing_id: Option<i64>,
        thumbs_dir: &Path,
    ) -> Result<i64, LibraryError> {
        let tx = self.conn.transaction()?;
        let stamp = draft.stamp();
        let title = draft.value(KEY_TITLE);
        let track_number = draft.value(KEY_TRACK).and_then(parse_int);
        let duration = draft.value(KEY_DURATION).and_then(parse_int);
        let year = draft.value(KEY_YEAR).and_then(parse_int);

        let track_id = match existing_id {
            Some(id) => {
                for table in ["track_genres", "track_artists", "track_meta"] {
                    tx.execute(&format!("DELETE FROM {} WHERE track_id = ?1", table), [id])?;
                }
                tx.execute(
                    "UPDATE tracks SET filesize = ?1, filetime = ?2, title = ?3, track_number = ?4,
                     duration = ?5, year = ?6 WHERE id = ?7",
                    params![stamp.size, stamp.mtime, title, track_number, duration, year, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO tracks (filename, filesize, filetime, folder_id, title, track_number,
                     duration, year) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        draft.filename(),
                        stamp.size,
                        stamp.mtime,
                        folder_id,
                        title,
                        track_number,
                        duration,
                        year
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        let visual_genre = link_names(&tx, NameTable::Genres, track_id, draft.values(KEY_GENRE))?;
        let visual_artist =
            link_names(&tx, NameTable::Artists, track_id, draft.values(KEY_ARTIST))?;
        let album = match draft.value(KEY_ALBUM) {
            Some(name) => Some(album_id(&tx, name)?),
            None => None,
        };
        let thumbnail = match draft.thumbnail() {
            Some(data) => store_thumbnail(&tx, data, thumbs_dir)?,
            None => None,
        };

        tx.execute(
            "UPDATE tracks SET album_id = ?1, visual_genre_id = ?2, visual_artist_id = ?3,
             thumbnail_id = ?4 WHERE id = ?5",
            params![album, visual_genre, visual_artist, thumbnail, track_id],
        )?;

        for (key, value) in draft.extra_entries() {
            let key_id = meta_key_id(&tx, key)?;
            let value_id = meta_value_id(&tx, key_id, value)?;
            tx.execute(
                "INSERT INTO track_meta (track_id, meta_value_id) VALUES (?1, ?2)",
                params![track_id, value_id],
            )?;
        }

        tx.commit()?;
        Ok(track_id)
    }
}

/// Links every distinct name to the track and returns the visual row: the
/// single name itself, or an aggregated `"A, B"` row for several.
fn link_names<'a>(
    tx: &Transaction<'_>,
    table: NameTable,
    track_id: i64,
    names: impl Iterator<Item = &'a str>,
) -> Result<Option<i64>, LibraryError> {
    let mut distinct: Vec<&str> = Vec::new();
    for name in names.map(str::trim).filter(|name| !name.is_empty()) {
        if !distinct.contains(&name) {
            distinct.push(name);
        }
    }

    let mut single = None;
    for name in &distinct {
        let id = name_id(tx, table, name, false)?;
        tx.execute(
            &format!(
                "INSERT INTO {} (track_id, {}) VALUES (?1, ?2)",
                table.link_table(),
                table.link_column()
            ),
            params![track_id, id],
        )?;
        single = Some(id);
    }

    match distinct.len() {
        0 => Ok(None),
        1 => Ok(single),
        _ => {
            let visual = distinct.join(AGGREGATE_SEP);
            Ok(Some(name_id(tx, table, &visual, true)?))
        }
    }
}

fn name_id(
    tx: &Transaction<'_>,
    table: NameTable,
    name: &str,
    aggregated: bool,
) -> Result<i64, LibraryError> {
    let existing: Option<i64> = tx
        .prepare_cached(&format!("SELECT id FROM {} WHERE name = ?1", table.table()))?
        .query_row([name], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        &format!(
            "INSERT INTO {} (name, aggregated) VALUES (?1, ?2)",
            table.table()
        ),
        params![name, aggregated],
    )?;
    Ok(tx.last_insert_rowid())
}

fn album_id(tx: &Transaction<'_>, name: &str) -> Result<i64, LibraryError> {
    let existing: Option<i64> = tx
        .prepare_cached("SELECT id FROM albums WHERE name = ?1")?
        .query_row([name], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute("INSERT INTO albums (name) VALUES (?1)", [name])?;
    Ok(tx.last_insert_rowid())
}

fn meta_key_id(tx: &Transaction<'_>, key: &str) -> Result<i64, LibraryError> {
    let existing: Option<i64> = tx
        .prepare_cached("SELECT id FROM meta_keys WHERE name = ?1")?
        .query_row([key], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute("INSERT INTO meta_keys (name) VALUES (?1)", [key])?;
    Ok(tx.last_insert_rowid())
}

fn meta_value_id(tx: &Transaction<'_>, key_id: i64, content: &str) -> Result<i64, LibraryError> {
    let existing: Option<i64> = tx
        .prepare_cached("SELECT id FROM meta_values WHERE meta_key_id = ?1 AND content = ?2")?
        .query_row(params![key_id, content], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO meta_values (meta_key_id, content) VALUES (?1, ?2)",
        params![key_id, content],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Dedups artwork by `(filesize, checksum)`. A failed image write drops the
/// thumbnail instead of failing the track.
fn store_thumbnail(
    tx: &Transaction<'_>,
    data: &[u8],
    thumbs_dir: &Path,
) -> Result<Option<i64>, LibraryError> {
    let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
    let checksum = content_checksum(data);
    let existing: Option<i64> = tx
        .prepare_cached("SELECT id FROM thumbnails WHERE filesize = ?1 AND checksum = ?2")?
        .query_row(params![size, checksum], |row| row.get(0))
        .optional()?;

    let (id, inserted) = match existing {
        Some(id) => (id, false),
        None => {
            tx.execute(
                "INSERT INTO thumbnails (filesize, checksum) VALUES (?1, ?2)",
                params![size, checksum],
            )?;
            (tx.last_insert_rowid(), true)
        }
    };

    let target = thumbnail_path(thumbs_dir, id);
    if !inserted && target.is_file() {
        return Ok(Some(id));
    }
    match fs::write(&target, data) {
        Ok(()) => Ok(Some(id)),
        Err(err) => {
            warn!("can't write thumbnail {:?}: {}", target, err);
            if inserted {
                tx.execute("DELETE FROM thumbnails WHERE id = ?1", [id])?;
            }
            Ok(None)
        }
    }
}

fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    let value = value.split('/').next().unwrap_or(value).trim();
    value.parse::<i64>().ok()
}
