use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    CountingFiles,
    Indexing,
    CleaningUp,
    Optimizing,
}

impl SyncStatus {
    pub fn code(self) -> i32 {
        match self {
            SyncStatus::Idle => 0,
            SyncStatus::CountingFiles => 1,
            SyncStatus::Indexing => 2,
            SyncStatus::CleaningUp => 3,
            SyncStatus::Optimizing => 4,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub code: i32,
    pub progress: f64,
    pub files_discovered: u64,
    pub files_processed: u64,
    pub files_saved: u64,
    pub tracks_refreshed: u64,
    pub text: String,
}

#[derive(Debug, Default)]
struct Progress {
    status: SyncStatus,
    progress: f64,
    removing: bool,
    files_discovered: u64,
    files_processed: u64,
    files_saved: u64,
    tracks_refreshed: u64,
}

impl Progress {
    fn text(&self) -> String {
        match self.status {
            SyncStatus::Idle => String::new(),
            SyncStatus::CountingFiles => format!("Counting files: {}", self.files_discovered),
            SyncStatus::Indexing => format!("Indexing: {:.2}%", self.progress * 100.0),
            SyncStatus::CleaningUp if self.removing => {
                format!("Removing old files: {:.2}%", self.progress * 100.0)
            }
            SyncStatus::CleaningUp => "Cleaning up.".to_string(),
            SyncStatus::Optimizing => "Optimizing.".to_string(),
        }
    }

    fn recompute(&mut self) {
        self.progress = if self.files_discovered == 0 {
            0.0
        } else {
            (self.files_processed as f64 / self.files_discovered as f64).min(1.0)
        };
    }
}

/// Called after phase changes, count flushes, progress recomputes and at
/// cycle end. Runs on the worker thread without the status lock held.
pub type StatusListener = Arc<dyn Fn(&SyncSnapshot) + Send + Sync>;

/// Status, progress and counters behind their own lock, separate from the
/// request queue.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<Progress>>,
    listeners: Arc<RwLock<Vec<StatusListener>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: StatusListener) {
        self.listeners.write().push(listener);
    }

    fn publish(&self) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Resets counters; `tracks_refreshed` keeps counting across cycles.
    pub fn begin_cycle(&self) {
        let mut state = self.inner.lock();
        let refreshed = state.tracks_refreshed;
        *state = Progress {
            tracks_refreshed: refreshed,
            ..Progress::default()
        };
    }

    pub fn set_phase(&self, status: SyncStatus) {
        {
            let mut state = self.inner.lock();
            state.status = status;
            state.progress = 0.0;
            state.removing = false;
        }
        self.publish();
    }

    pub fn begin_removal(&self) {
        {
            let mut state = self.inner.lock();
            state.status = SyncStatus::CleaningUp;
            state.progress = 0.0;
            state.removing = true;
        }
        self.publish();
    }

    pub fn finish_removal(&self) {
        let mut state = self.inner.lock();
        state.removing = false;
        state.progress = 0.0;
    }

    pub fn add_discovered(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.inner.lock().files_discovered += count;
        self.publish();
    }

    /// Counts one visited file; the fraction is recomputed every `interval` files.
    pub fn file_processed(&self, interval: u64) {
        let recomputed = {
            let mut state = self.inner.lock();
            state.files_processed += 1;
            let due = interval <= 1 || state.files_processed % interval == 0;
            if due {
                state.recompute();
            }
            due
        };
        if recomputed {
            self.publish();
        }
    }

    /// Counts one written track; bumps `tracks_refreshed` every `interval` saves.
    pub fn file_saved(&self, interval: u64) {
        let mut state = self.inner.lock();
        state.files_saved += 1;
        if interval > 0 && state.files_saved % interval == 0 {
            state.tracks_refreshed += 1;
        }
    }

    pub fn set_progress(&self, fraction: f64) {
        self.inner.lock().progress = fraction.clamp(0.0, 1.0);
    }

    pub fn notify_refreshed(&self) {
        self.inner.lock().tracks_refreshed += 1;
    }

    pub fn finish(&self) {
        {
            let mut state = self.inner.lock();
            state.status = SyncStatus::Idle;
            state.removing = false;
            state.progress = 0.0;
        }
        self.publish();
    }

    pub fn status_code(&self) -> i32 {
        self.inner.lock().status.code()
    }

    pub fn status_text(&self) -> String {
        self.inner.lock().text()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.inner.lock();
        SyncSnapshot {
            status: state.status,
            code: state.status.code(),
            progress: state.progress,
            files_discovered: state.files_discovered,
            files_processed: state.files_processed,
            files_saved: state.files_saved,
            tracks_refreshed: state.tracks_refreshed,
            text: state.text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusBoard, SyncSnapshot, SyncStatus};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn texts_follow_phase() {
        let board = StatusBoard::new();
        assert_eq!(board.status_text(), "");
        assert_eq!(board.status_code(), 0);

        board.begin_cycle();
        board.set_phase(SyncStatus::CountingFiles);
        board.add_discovered(40);
        assert_eq!(board.status_text(), "Counting files: 40");

        board.set_phase(SyncStatus::Indexing);
        for _ in 0..10 {
            board.file_processed(5);
        }
        assert_eq!(board.status_code(), 2);
        assert_eq!(board.status_text(), "Indexing: 25.00%");

        board.begin_removal();
        board.set_progress(0.5);
        assert_eq!(board.status_text(), "Removing old files: 50.00%");
        board.finish_removal();
        assert_eq!(board.status_text(), "Cleaning up.");

        board.set_phase(SyncStatus::Optimizing);
        assert_eq!(board.status_text(), "Optimizing.");
        board.finish();
        assert_eq!(board.snapshot().status, SyncStatus::Idle);
    }

    #[test]
    fn progress_updates_only_on_interval() {
        let board = StatusBoard::new();
        board.add_discovered(100);
        for _ in 0..24 {
            board.file_processed(25);
        }
        assert_eq!(board.snapshot().progress, 0.0);
        board.file_processed(25);
        assert_eq!(board.snapshot().progress, 0.25);
    }

    #[test]
    fn refresh_counter_survives_cycles() {
        let board = StatusBoard::new();
        board.file_saved(2);
        board.file_saved(2);
        board.notify_refreshed();
        board.begin_cycle();
        let snapshot = board.snapshot();
        assert_eq!(snapshot.tracks_refreshed, 2);
        assert_eq!(snapshot.files_saved, 0);
    }

    #[test]
    fn listeners_see_phase_changes() {
        let board = StatusBoard::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        board.subscribe(Arc::new(move |snapshot: &SyncSnapshot| {
            sink.lock().push((snapshot.status, snapshot.files_discovered));
        }));

        board.begin_cycle();
        board.set_phase(SyncStatus::CountingFiles);
        board.add_discovered(0);
        board.add_discovered(3);
        board.finish();

        assert_eq!(
            *seen.lock(),
            vec![
                (SyncStatus::CountingFiles, 0),
                (SyncStatus::CountingFiles, 3),
                (SyncStatus::Idle, 3),
            ]
        );
    }
}
