use std::fs;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{leaf_name, normalize_dir_path, FileStamp};
use metadata::{ReaderRegistry, TagReader, TrackDraft, KEY_TITLE};
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::LibraryError;
use crate::maintenance::SortTable;
use crate::queue::PathQueue;
use crate::status::{StatusBoard, SyncStatus};
use crate::store::{IndexStore, PathRow};
use crate::writer::thumbnail_path;

const COUNT_FLUSH: u64 = 256;

/// Everything a cycle needs besides the store connection. Cheap to clone;
/// the queue, status board and cancel token are shared handles.
#[derive(Clone)]
pub struct SyncContext {
    pub registry: ReaderRegistry,
    pub queue: PathQueue,
    pub status: StatusBoard,
    pub cancel: CancelToken,
    pub config: SyncConfig,
    pub thumbs_dir: PathBuf,
}

impl SyncContext {
    pub fn new(library_root: &Path, registry: ReaderRegistry, config: SyncConfig) -> Self {
        let thumbs_dir = library_root.join(&config.thumbnail_dir);
        Self {
            registry,
            queue: PathQueue::new(),
            status: StatusBoard::new(),
            cancel: CancelToken::new(),
            config,
            thumbs_dir,
        }
    }

    pub fn prepare_thumbnail_dir(&self) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.thumbs_dir).map_err(|source| LibraryError::ThumbnailDir {
            path: self.thumbs_dir.clone(),
            source,
        })
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncOutcome {
    pub requests_applied: usize,
    pub active_paths: usize,
    pub files_discovered: u64,
    pub files_processed: u64,
    pub tracks_saved: u64,
    pub folders_removed: u64,
    pub tracks_removed: u64,
    pub rows_cleaned: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

pub struct SyncEngine<'a> {
    store: &'a mut IndexStore,
    ctx: &'a SyncContext,
    readers: Vec<Arc<dyn TagReader>>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a mut IndexStore, ctx: &'a SyncContext) -> Self {
        Self {
            store,
            ctx,
            readers: Vec::new(),
        }
    }

    /// One full pass: apply requests, count, index, delete, clean up, optimize.
    pub fn synchronize(&mut self) -> Result<SyncOutcome, LibraryError> {
        let started = Instant::now();
        self.readers = self.ctx.registry.list();
        self.ctx.status.begin_cycle();
        info!("sync started with {} tag readers", self.readers.len());

        let mut outcome = SyncOutcome::default();
        let result = self.run_phases(&mut outcome);

        self.readers.clear();
        self.ctx.status.finish();
        outcome.elapsed = started.elapsed();
        outcome.cancelled = outcome.cancelled || self.cancelled();

        match result {
            Ok(()) => {
                info!(
                    "sync finished in {:?}: {} files, {} saved, {} removed{}",
                    outcome.elapsed,
                    outcome.files_processed,
                    outcome.tracks_saved,
                    outcome.tracks_removed,
                    if outcome.cancelled { " (cancelled)" } else { "" }
                );
                Ok(outcome)
            }
            Err(err) if err.is_interrupted() => {
                info!("sync interrupted after {:?}", outcome.elapsed);
                outcome.cancelled = true;
                Ok(outcome)
            }
            Err(err) => Err(err),
        }
    }

    fn run_phases(&mut self, outcome: &mut SyncOutcome) -> Result<(), LibraryError> {
        outcome.requests_applied = self.ctx.queue.apply(self.store)?;

        let paths = self.active_paths()?;
        outcome.active_paths = paths.len();

        self.ctx.status.set_phase(SyncStatus::CountingFiles);
        for path in &paths {
            if self.cancelled() {
                break;
            }
            outcome.files_discovered += self.count_files(Path::new(&path.path));
        }
        if self.cancelled() {
            outcome.cancelled = true;
            return Ok(());
        }

        self.ctx.status.set_phase(SyncStatus::Indexing);
        for path in &paths {
            if self.cancelled() {
                break;
            }
            debug!("indexing {}", path.path);
            if let Err(err) = self.index_directory(Path::new(&path.path), path.id, None, outcome)
            {
                if err.is_interrupted() {
                    return Err(err);
                }
                warn!("indexing {} stopped: {}", path.path, err);
            }
        }
        if self.cancelled() {
            outcome.cancelled = true;
            return Ok(());
        }

        self.remove_missing(&paths, outcome)?;
        if self.cancelled() {
            outcome.cancelled = true;
            return Ok(());
        }

        self.ctx.status.set_phase(SyncStatus::CleaningUp);
        outcome.rows_cleaned = self.cleanup()?;
        self.ctx.status.notify_refreshed();
        if self.cancelled() {
            outcome.cancelled = true;
            return Ok(());
        }

        self.ctx.status.set_phase(SyncStatus::Optimizing);
        self.optimize()?;
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    /// Registered paths whose directory exists right now. Missing roots are
    /// skipped, never deleted.
    fn active_paths(&self) -> Result<Vec<PathRow>, LibraryError> {
        let mut active = Vec::new();
        for row in self.store.paths()? {
            if Path::new(&row.path).is_dir() {
                active.push(row);
            } else {
                info!("library path {} is unavailable; skipping", row.path);
            }
        }
        Ok(active)
    }

    fn count_files(&self, root: &Path) -> u64 {
        let mut total = 0u64;
        let mut unflushed = 0u64;
        let mut walker = WalkDir::new(root).follow_links(false).into_iter();
        loop {
            if self.cancelled() {
                break;
            }
            let entry = match walker.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    debug!("skipping while counting: {}", err);
                    continue;
                }
                None => break,
            };
            if entry.file_type().is_file() {
                total += 1;
                unflushed += 1;
                if unflushed == COUNT_FLUSH {
                    self.ctx.status.add_discovered(unflushed);
                    unflushed = 0;
                }
            }
        }
        self.ctx.status.add_discovered(unflushed);
        total
    }

    fn index_directory(
        &mut self,
        dir: &Path,
        path_id: i64,
        parent_id: Option<i64>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), LibraryError> {
        if self.cancelled() {
            return Ok(());
        }
        let fullpath = normalize_dir_path(dir);
        let folder_id = self
            .store
            .ensure_folder(&leaf_name(dir), path_id, parent_id, &fullpath)?;

        let mut entries = match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(err) => {
                warn!("can't read directory {:?}: {}", dir, err);
                return Ok(());
            }
        };
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            if self.cancelled() {
                return Ok(());
            }
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("can't stat {:?}: {}", entry.path(), err);
                    continue;
                }
            };
            let child = entry.path();
            let result = if file_type.is_dir() {
                self.index_directory(&child, path_id, Some(folder_id), outcome)
            } else if file_type.is_file() {
                self.index_file(child.clone(), folder_id, outcome)
            } else {
                Ok(())
            };
            if let Err(err) = result {
                if err.is_interrupted() {
                    return Err(err);
                }
                warn!("skipping {:?}: {}", child, err);
            }
        }
        Ok(())
    }

    fn index_file(
        &mut self,
        path: PathBuf,
        folder_id: i64,
        outcome: &mut SyncOutcome,
    ) -> Result<(), LibraryError> {
        outcome.files_processed += 1;
        self.ctx
            .status
            .file_processed(self.ctx.config.progress_interval);

        let stamp = FileStamp::from_metadata(&fs::metadata(&path)?);
        let filename = leaf_name(&path);
        let existing = self.store.track_stamp(folder_id, &filename)?;
        if let Some((_, stored)) = existing {
            if stored == stamp {
                trace!("unchanged {:?}", path);
                return Ok(());
            }
        }

        let mut draft = TrackDraft::new(path, stamp);
        if !self.read_tags(&mut draft) {
            if !self.ctx.config.index_untagged_files {
                trace!("no tag reader accepted {:?}", draft.path());
                return Ok(());
            }
            draft.replace_value(KEY_TITLE, filename);
        }

        self.store.save_track(
            &draft,
            folder_id,
            existing.map(|(id, _)| id),
            &self.ctx.thumbs_dir,
        )?;
        outcome.tracks_saved += 1;
        self.ctx.status.file_saved(self.ctx.config.refresh_interval);
        Ok(())
    }

    /// Offers the file to every reader that claims its extension, in
    /// registration order. Successful reads layer on top of each other, so a
    /// later reader overrides only the keys it sets. A failing reader works on
    /// a copy that is thrown away.
    fn read_tags(&self, draft: &mut TrackDraft) -> bool {
        let mut best: Option<TrackDraft> = None;
        for reader in &self.readers {
            if !reader.can_read_tag(draft.extension()) {
                continue;
            }
            let mut scratch = best.clone().unwrap_or_else(|| draft.clone());
            let ok = panic::catch_unwind(AssertUnwindSafe(|| reader.read_tag(&mut scratch)))
                .unwrap_or_else(|_| {
                    warn!("tag reader {} panicked on {:?}", reader.name(), draft.path());
                    false
                });
            if ok {
                best = Some(scratch);
            } else {
                trace!("tag reader {} failed on {:?}", reader.name(), draft.path());
            }
        }
        match best {
            Some(read) => {
                *draft = read;
                true
            }
            None => false,
        }
    }

    fn remove_missing(
        &mut self,
        paths: &[PathRow],
        outcome: &mut SyncOutcome,
    ) -> Result<(), LibraryError> {
        self.ctx.status.begin_removal();
        for path in paths {
            if self.cancelled() {
                return Ok(());
            }
            let root = Path::new(&path.path);

            for folder in self.store.folders_for_path(path.id)? {
                if self.cancelled() {
                    return Ok(());
                }
                if confirmed_missing(root, Path::new(&folder.fullpath))
                    && self.store.delete_folder(folder.id)?
                {
                    debug!("removed folder {}", folder.fullpath);
                    outcome.folders_removed += 1;
                }
            }
            outcome.tracks_removed += self.store.delete_tracks_without_folder()? as u64;

            if !self.ctx.config.remove_missing_files {
                continue;
            }
            let tracks = self.store.tracks_for_path(path.id)?;
            let total = tracks.len().max(1) as f64;
            for (index, track) in tracks.iter().enumerate() {
                if self.cancelled() {
                    return Ok(());
                }
                if index % 25 == 0 {
                    self.ctx.status.set_progress(index as f64 / total);
                }
                if confirmed_missing(root, Path::new(&track.path))
                    && self.store.delete_track(track.id)?
                {
                    trace!("removed track {}", track.path);
                    outcome.tracks_removed += 1;
                }
            }
        }
        self.ctx.status.finish_removal();
        Ok(())
    }

    fn cleanup(&mut self) -> Result<usize, LibraryError> {
        let stats = self.store.delete_unreferenced()?;
        for id in self.store.unreferenced_thumbnails()? {
            let file = thumbnail_path(&self.ctx.thumbs_dir, id);
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!("can't remove thumbnail {:?}: {}", file, err);
                    continue;
                }
            }
            self.store.delete_thumbnail(id)?;
        }
        if self.cancelled() {
            return Ok(stats.rows_removed);
        }
        self.store.reclaim_space()?;
        Ok(stats.rows_removed)
    }

    fn optimize(&mut self) -> Result<(), LibraryError> {
        let batch = self.ctx.config.optimize_batch_size;
        for table in SortTable::ALL {
            if !self
                .store
                .optimize_sort_order(table, batch, &self.ctx.cancel)?
            {
                return Ok(());
            }
        }
        self.store.optimize_track_order(batch, &self.ctx.cancel)?;
        Ok(())
    }
}

/// Only a definite "not found" under a still reachable root counts as gone.
fn confirmed_missing(root: &Path, target: &Path) -> bool {
    match fs::symlink_metadata(target) {
        Ok(_) => false,
        Err(err) if err.kind() == ErrorKind::NotFound => root.is_dir(),
        Err(err) => {
            debug!("can't check {:?}: {}; keeping it", target, err);
            false
        }
    }
}

/// Blocking one-shot pass on its own connection.
pub fn synchronize(db_path: &Path, ctx: &SyncContext) -> Result<SyncOutcome, LibraryError> {
    ctx.prepare_thumbnail_dir()?;
    let mut store = IndexStore::open(db_path)?;
    store.set_interrupt(&ctx.cancel);
    SyncEngine::new(&mut store, ctx).synchronize()
}

#[cfg(test)]
mod tests {
    use super::{synchronize, SyncContext, SyncEngine};
    use crate::config::SyncConfig;
    use crate::status::{SyncSnapshot, SyncStatus};
    use crate::store::IndexStore;
    use crate::test_support::{Behavior, Scratch, StubReader};
    use common::{normalize_dir_path, FileStamp};
    use metadata::{ReaderRegistry, KEY_ALBUM, KEY_TITLE};
    use rusqlite::OptionalExtension;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct Fixture {
        scratch: Scratch,
        music: PathBuf,
        db: PathBuf,
        ctx: SyncContext,
    }

    fn fixture(readers: Vec<StubReader>, config: SyncConfig) -> Fixture {
        let scratch = Scratch::new("engine");
        let music = scratch.path().join("music");
        fs::create_dir_all(&music).unwrap();
        let registry = ReaderRegistry::new();
        for reader in readers {
            registry.register(Arc::new(reader));
        }
        let ctx = SyncContext::new(scratch.path(), registry, config);
        let db = scratch.path().join("library.db");
        ctx.queue.add(&music.to_string_lossy());
        Fixture {
            scratch,
            music,
            db,
            ctx,
        }
    }

    fn titles(store: &IndexStore) -> Vec<(String, Option<String>)> {
        let mut stmt = store
            .conn
            .prepare("SELECT filename, title FROM tracks ORDER BY filename")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        rows.map(|row| row.unwrap()).collect()
    }

    fn stored_stamp(store: &IndexStore, file: &Path) -> Option<FileStamp> {
        let folder = normalize_dir_path(file.parent().unwrap());
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        store
            .conn
            .query_row(
                "SELECT t.filesize, t.filetime FROM tracks t JOIN folders f ON f.id = t.folder_id
                 WHERE f.fullpath = ?1 AND t.filename = ?2",
                [folder, name],
                |row| {
                    Ok(FileStamp {
                        size: row.get(0)?,
                        mtime: row.get(1)?,
                    })
                },
            )
            .optional()
            .unwrap()
    }

    #[test]
    fn indexes_single_tagged_file() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        fx.scratch.write("music/a.mp3", b"frames");

        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.tracks_saved, 1);
        assert!(!outcome.cancelled);

        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(store.paths().unwrap().len(), 1);
        let folders: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM folders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folders, 1);
        assert_eq!(
            titles(&store),
            vec![("a.mp3".to_string(), Some("X".to_string()))]
        );
        assert_eq!(fx.ctx.status.status_code(), 0);
        assert_eq!(fx.ctx.status.status_text(), "");
    }

    #[test]
    fn unchanged_library_writes_nothing() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        fx.scratch.write("music/a.mp3", b"one");
        fx.scratch.write("music/rock/b.mp3", b"two");

        let first = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(first.tracks_saved, 2);
        let second = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(second.tracks_saved, 0);
        assert_eq!(second.files_processed, 2);
        assert_eq!(second.tracks_removed, 0);
    }

    #[test]
    fn every_file_gets_matching_row() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        let files = vec![
            fx.scratch.write("music/a.mp3", b"a"),
            fx.scratch.write("music/notes.txt", b"liner notes"),
            fx.scratch.write("music/x/b.mp3", b"bb"),
            fx.scratch.write("music/x/y/c.mp3", b"ccc"),
        ];
        synchronize(&fx.db, &fx.ctx).unwrap();

        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(store.track_count().unwrap(), 4);
        for file in &files {
            let expected = FileStamp::from_metadata(&fs::metadata(file).unwrap());
            assert_eq!(stored_stamp(&store, file), Some(expected), "{:?}", file);
        }
        let untagged = titles(&store)
            .into_iter()
            .find(|(name, _)| name == "notes.txt")
            .unwrap();
        assert_eq!(untagged.1.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn untagged_files_skipped_when_disabled() {
        let config = SyncConfig {
            index_untagged_files: false,
            ..SyncConfig::default()
        };
        let fx = fixture(vec![StubReader::titled("stub", "X")], config);
        fx.scratch.write("music/a.mp3", b"a");
        fx.scratch.write("music/notes.txt", b"n");
        synchronize(&fx.db, &fx.ctx).unwrap();

        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(titles(&store).len(), 1);
    }

    #[test]
    fn deleted_subdirectory_is_reconciled() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        fx.scratch.write("music/gone/1.mp3", b"1");
        let kept = fx.scratch.write("music/kept/2.mp3", b"2");
        synchronize(&fx.db, &fx.ctx).unwrap();

        let kept_id = {
            let store = IndexStore::open(&fx.db).unwrap();
            store
                .conn
                .query_row("SELECT id FROM tracks WHERE filename = '2.mp3'", [], |row| {
                    row.get::<_, i64>(0)
                })
                .unwrap()
        };

        fs::remove_dir_all(fx.music.join("gone")).unwrap();
        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.folders_removed, 1);

        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(titles(&store).len(), 1);
        let id: i64 = store
            .conn
            .query_row("SELECT id FROM tracks WHERE filename = '2.mp3'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(id, kept_id);
        assert!(stored_stamp(&store, &kept).is_some());
        let gone: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM folders WHERE name = 'gone'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(gone, 0);
    }

    #[test]
    fn deleted_file_is_removed_and_aggregates_cleaned() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        let doomed = fx.scratch.write("music/a.mp3", b"a");
        fx.scratch.write("music/b.mp3", b"b");
        synchronize(&fx.db, &fx.ctx).unwrap();

        fs::remove_file(&doomed).unwrap();
        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.tracks_removed, 1);
        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(
            titles(&store),
            vec![("b.mp3".to_string(), Some("X".to_string()))]
        );
    }

    #[test]
    fn unreachable_root_keeps_rows() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        fx.scratch.write("music/a.mp3", b"a");
        synchronize(&fx.db, &fx.ctx).unwrap();

        let moved = fx.scratch.path().join("unmounted");
        fs::rename(&fx.music, &moved).unwrap();
        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.active_paths, 0);
        assert_eq!(outcome.tracks_removed, 0);

        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(store.paths().unwrap().len(), 1);
        assert_eq!(store.track_count().unwrap(), 1);
    }

    #[test]
    fn last_successful_reader_wins() {
        let fx = fixture(
            vec![
                StubReader::titled("first", "first"),
                StubReader::titled("second", "second"),
            ],
            SyncConfig::default(),
        );
        fx.scratch.write("music/a.mp3", b"a");
        synchronize(&fx.db, &fx.ctx).unwrap();
        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(titles(&store)[0].1.as_deref(), Some("second"));
    }

    #[test]
    fn failing_readers_keep_earlier_result() {
        let fx = fixture(
            vec![
                StubReader::titled("good", "good"),
                StubReader {
                    name: "bad",
                    behavior: Behavior::FailAfter("junk"),
                },
                StubReader {
                    name: "boom",
                    behavior: Behavior::Panic,
                },
            ],
            SyncConfig::default(),
        );
        fx.scratch.write("music/a.mp3", b"a");
        synchronize(&fx.db, &fx.ctx).unwrap();
        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(titles(&store)[0].1.as_deref(), Some("good"));
    }

    #[test]
    fn requests_during_cycle_wait_for_next_cycle() {
        let scratch_late = Scratch::new("late");
        let late_path = scratch_late.path().to_string_lossy().to_string();
        let fx = fixture(Vec::new(), SyncConfig::default());
        fx.ctx.registry.register(Arc::new(StubReader {
            name: "enqueue",
            behavior: Behavior::Enqueue(fx.ctx.queue.clone(), late_path.clone()),
        }));
        fx.scratch.write("music/a.mp3", b"a");

        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.requests_applied, 1);
        assert_eq!(fx.ctx.queue.len(), 1);
        {
            let store = IndexStore::open(&fx.db).unwrap();
            assert_eq!(store.paths().unwrap().len(), 1);
        }

        fx.ctx.registry.unregister("enqueue");
        let next = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(next.requests_applied, 1);
        let store = IndexStore::open(&fx.db).unwrap();
        assert_eq!(store.paths().unwrap().len(), 2);
    }

    #[test]
    fn cancelled_count_returns_promptly() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        for index in 0..50 {
            fx.scratch.write(&format!("music/d{}/t.mp3", index), b"t");
        }
        let mut store = IndexStore::open(&fx.db).unwrap();
        fx.ctx.cancel.cancel();

        let outcome = SyncEngine::new(&mut store, &fx.ctx).synchronize().unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.files_discovered, 0);
        assert_eq!(outcome.tracks_saved, 0);
        assert!(store.conn.is_autocommit());
        assert_eq!(store.track_count().unwrap(), 0);
        assert_eq!(fx.ctx.status.status_code(), 0);
    }

    #[test]
    fn walk_stops_when_cancelled_mid_count() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        let total = 600;
        for index in 0..total {
            fx.scratch
                .write(&format!("music/d{}/t{}.mp3", index / 50, index), b"t");
        }
        let cancel = fx.ctx.cancel.clone();
        fx.ctx.status.subscribe(Arc::new(move |snapshot: &SyncSnapshot| {
            if snapshot.status == SyncStatus::CountingFiles && snapshot.files_discovered > 0 {
                cancel.cancel();
            }
        }));
        let mut store = IndexStore::open(&fx.db).unwrap();

        let outcome = SyncEngine::new(&mut store, &fx.ctx).synchronize().unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.files_discovered > 0);
        assert!(outcome.files_discovered < total);
        assert_eq!(outcome.tracks_saved, 0);
        assert!(store.conn.is_autocommit());
        assert_eq!(store.track_count().unwrap(), 0);
        assert_eq!(fx.ctx.status.status_code(), 0);
    }

    #[test]
    fn refresh_counter_bumps_every_hundred_saves() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        for index in 0..199 {
            fx.scratch.write(&format!("music/t{}.mp3", index), b"t");
        }
        let outcome = synchronize(&fx.db, &fx.ctx).unwrap();
        assert_eq!(outcome.tracks_saved, 199);
        // one at the 100th save, one after cleanup
        assert_eq!(fx.ctx.status.snapshot().tracks_refreshed, 2);
    }

    #[test]
    fn layered_readers_keep_earlier_fields() {
        const GENERIC: &[(&str, &str)] = &[(KEY_TITLE, "generic"), (KEY_ALBUM, "Album A")];
        const SPECIFIC: &[(&str, &str)] = &[(KEY_TITLE, "specific")];
        let fx = fixture(
            vec![
                StubReader {
                    name: "generic",
                    behavior: Behavior::Values(GENERIC),
                },
                StubReader {
                    name: "specific",
                    behavior: Behavior::Values(SPECIFIC),
                },
            ],
            SyncConfig::default(),
        );
        fx.scratch.write("music/a.mp3", b"a");
        synchronize(&fx.db, &fx.ctx).unwrap();

        let store = IndexStore::open(&fx.db).unwrap();
        let (title, album): (String, String) = store
            .conn
            .query_row(
                "SELECT t.title, al.name FROM tracks t JOIN albums al ON al.id = t.album_id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "specific");
        assert_eq!(album, "Album A");
    }

    #[test]
    fn artists_sorted_case_insensitively_after_cycle() {
        let fx = fixture(
            vec![StubReader {
                name: "stem",
                behavior: Behavior::ArtistFromStem,
            }],
            SyncConfig::default(),
        );
        for name in ["Bee", "apple", "Cherry"] {
            fx.scratch.write(&format!("music/{}.mp3", name), b"x");
        }
        synchronize(&fx.db, &fx.ctx).unwrap();

        let store = IndexStore::open(&fx.db).unwrap();
        let mut stmt = store
            .conn
            .prepare("SELECT name, sort_order FROM artists ORDER BY sort_order")
            .unwrap();
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(
            rows,
            vec![
                ("apple".to_string(), 0),
                ("Bee".to_string(), 1),
                ("Cherry".to_string(), 2)
            ]
        );
    }

    #[test]
    fn sort_order_assigned_after_cycle() {
        let fx = fixture(vec![StubReader::titled("stub", "X")], SyncConfig::default());
        fx.scratch.write("music/b.mp3", b"b");
        fx.scratch.write("music/a.mp3", b"a");
        synchronize(&fx.db, &fx.ctx).unwrap();

        let store = IndexStore::open(&fx.db).unwrap();
        let mut stmt = store
            .conn
            .prepare("SELECT filename FROM tracks ORDER BY sort_order")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(names, vec!["a.mp3".to_string(), "b.mp3".to_string()]);
    }
}
