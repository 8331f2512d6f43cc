use common::sort_key;
use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::LibraryError;
use crate::store::IndexStore;

const UNREFERENCED: &[(&str, &str)] = &[
    (
        "track_artists",
        "DELETE FROM track_artists WHERE track_id NOT IN (SELECT id FROM tracks)",
    ),
    (
        "artists",
        "DELETE FROM artists
         WHERE id NOT IN (SELECT visual_artist_id FROM tracks WHERE visual_artist_id IS NOT NULL)
         AND id NOT IN (SELECT artist_id FROM track_artists)",
    ),
    (
        "track_genres",
        "DELETE FROM track_genres WHERE track_id NOT IN (SELECT id FROM tracks)",
    ),
    (
        "genres",
        "DELETE FROM genres
         WHERE id NOT IN (SELECT visual_genre_id FROM tracks WHERE visual_genre_id IS NOT NULL)
         AND id NOT IN (SELECT genre_id FROM track_genres)",
    ),
    (
        "albums",
        "DELETE FROM albums
         WHERE id NOT IN (SELECT album_id FROM tracks WHERE album_id IS NOT NULL)",
    ),
    (
        "track_meta",
        "DELETE FROM track_meta WHERE track_id NOT IN (SELECT id FROM tracks)",
    ),
    (
        "meta_values",
        "DELETE FROM meta_values WHERE id NOT IN (SELECT meta_value_id FROM track_meta)",
    ),
    (
        "meta_keys",
        "DELETE FROM meta_keys WHERE id NOT IN (SELECT meta_key_id FROM meta_values)",
    ),
];

/// Tables whose rows get a browse `sort_order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SortTable {
    Genres,
    Artists,
    Albums,
    MetaValues,
}

impl SortTable {
    pub const ALL: [SortTable; 4] = [
        SortTable::Genres,
        SortTable::Artists,
        SortTable::Albums,
        SortTable::MetaValues,
    ];

    fn table(self) -> &'static str {
        match self {
            SortTable::Genres => "genres",
            SortTable::Artists => "artists",
            SortTable::Albums => "albums",
            SortTable::MetaValues => "meta_values",
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortTable::MetaValues => "content",
            _ => "name",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CleanupStats {
    pub rows_removed: usize,
}

impl IndexStore {
    pub fn delete_unreferenced(&self) -> Result<CleanupStats, LibraryError> {
        let mut stats = CleanupStats::default();
        for (table, sql) in UNREFERENCED {
            let removed = self.conn.execute(sql, [])?;
            if removed > 0 {
                debug!("removed {} unreferenced rows from {}", removed, table);
            }
            stats.rows_removed += removed;
        }
        Ok(stats)
    }

    pub fn unreferenced_thumbnails(&self) -> Result<Vec<i64>, LibraryError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM thumbnails
             WHERE id NOT IN (SELECT thumbnail_id FROM tracks WHERE thumbnail_id IS NOT NULL)",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn delete_thumbnail(&self, thumbnail_id: i64) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM thumbnails WHERE id = ?1", [thumbnail_id])?;
        Ok(removed > 0)
    }

    pub fn reclaim_space(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch("ANALYZE; VACUUM;")?;
        Ok(())
    }

    /// Assigns `0..n` by trimmed, case-insensitive name. Returns false when
    /// cancelled between batches; batches already committed stay.
    pub fn optimize_sort_order(
        &mut self,
        table: SortTable,
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<bool, LibraryError> {
        let mut rows: Vec<(String, i64)> = {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT id, {} FROM {}", table.column(), table.table()))?;
            let mapped = stmt.query_map([], |row| {
                let name: String = row.get(1)?;
                Ok((sort_key(&name), row.get(0)?))
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            rows
        };
        rows.sort();

        let ids: Vec<i64> = rows.into_iter().map(|(_, id)| id).collect();
        let sql = format!("UPDATE {} SET sort_order = ?1 WHERE id = ?2", table.table());
        self.write_sort_order(&sql, &ids, batch_size, cancel)
    }

    /// Orders tracks by genre, artist, album, track number, folder and file.
    pub fn optimize_track_order(
        &mut self,
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<bool, LibraryError> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT t.id FROM tracks t
                 LEFT JOIN genres g ON g.id = t.visual_genre_id
                 LEFT JOIN artists ar ON ar.id = t.visual_artist_id
                 LEFT JOIN albums al ON al.id = t.album_id
                 LEFT JOIN folders f ON f.id = t.folder_id
                 ORDER BY g.sort_order, ar.sort_order, al.sort_order, t.track_number,
                          f.fullpath, t.filename, t.id",
            )?;
            let mapped = stmt.query_map([], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in mapped {
                ids.push(row?);
            }
            ids
        };
        self.write_sort_order(
            "UPDATE tracks SET sort_order = ?1 WHERE id = ?2",
            &ids,
            batch_size,
            cancel,
        )
    }

    fn write_sort_order(
        &mut self,
        sql: &str,
        ids: &[i64],
        batch_size: usize,
        cancel: &CancelToken,
    ) -> Result<bool, LibraryError> {
        let batch_size = batch_size.max(1);
        for (batch, chunk) in ids.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(sql)?;
                for (offset, id) in chunk.iter().enumerate() {
                    let order = i64::try_from(batch * batch_size + offset).unwrap_or(i64::MAX);
                    stmt.execute([order, *id])?;
                }
            }
            tx.commit()?;
        }
        Ok(true)
    }
}
