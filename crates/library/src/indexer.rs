use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use metadata::ReaderRegistry;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::engine::{SyncContext, SyncEngine};
use crate::error::LibraryError;
use crate::status::{StatusListener, SyncSnapshot};
use crate::store::IndexStore;

/// Owns the background worker that keeps the index in sync with the
/// registered library paths.
pub struct Indexer {
    ctx: SyncContext,
    db_path: PathBuf,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Indexer {
    /// Creates the thumbnail directory, checks the database schema and starts
    /// the worker thread.
    pub fn startup(
        library_root: &Path,
        db_path: &Path,
        registry: ReaderRegistry,
        config: SyncConfig,
    ) -> Result<Self, LibraryError> {
        let ctx = SyncContext::new(library_root, registry, config);
        ctx.prepare_thumbnail_dir()?;
        drop(IndexStore::open(db_path)?);

        let worker_ctx = ctx.clone();
        let worker_db = db_path.to_path_buf();
        let handle = thread::Builder::new()
            .name("indexer".to_string())
            .spawn(move || run_worker(worker_ctx, worker_db))
            .map_err(LibraryError::WorkerSpawn)?;

        info!("indexer started for {:?}", library_root);
        Ok(Self {
            ctx,
            db_path: db_path.to_path_buf(),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Raises the exit flag, wakes the worker and joins it. Safe to call twice.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };
        let cancel = &self.ctx.cancel;
        self.ctx.queue.signal(|| cancel.cancel());
        if handle.join().is_err() {
            warn!("indexer worker panicked");
        }
        info!("indexer stopped");
    }

    pub fn add_path(&self, path: &str) {
        if self.ctx.queue.add(path) {
            self.schedule_rescan();
        }
    }

    pub fn remove_path(&self, path: &str) {
        if self.ctx.queue.remove(path) {
            self.schedule_rescan();
        }
    }

    /// Cancels the running cycle, if any, and starts a fresh one.
    pub fn schedule_rescan(&self) {
        let cancel = &self.ctx.cancel;
        self.ctx.queue.signal(|| cancel.request_restart());
    }

    pub fn paths(&self) -> Result<Vec<String>, LibraryError> {
        let store = IndexStore::open_read_only(&self.db_path)?;
        Ok(store.paths()?.into_iter().map(|row| row.path).collect())
    }

    pub fn status_code(&self) -> i32 {
        self.ctx.status.status_code()
    }

    pub fn status(&self) -> String {
        self.ctx.status.status_text()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.ctx.status.snapshot()
    }

    pub fn subscribe(&self, listener: StatusListener) {
        self.ctx.status.subscribe(listener);
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(ctx: SyncContext, db_path: PathBuf) {
    let mut first = true;
    while !ctx.cancel.is_exit() {
        let cancel = &ctx.cancel;
        ctx.queue.signal(|| cancel.clear_restart());

        if !first || ctx.config.sync_on_startup {
            run_cycle(&ctx, &db_path);
        }
        first = false;

        let deadline = ctx.config.idle_timeout().map(|timeout| Instant::now() + timeout);
        ctx.queue.wait(deadline, || cancel.is_cancelled());
    }
}

fn run_cycle(ctx: &SyncContext, db_path: &Path) {
    let mut store = match IndexStore::open(db_path) {
        Ok(store) => store,
        Err(err) => {
            warn!("can't open index {:?}: {}", db_path, err);
            return;
        }
    };
    store.set_interrupt(&ctx.cancel);
    if let Err(err) = SyncEngine::new(&mut store, ctx).synchronize() {
        warn!("sync failed: {}", err);
    }
}
